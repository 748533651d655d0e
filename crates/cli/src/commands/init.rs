//! `mathtutor init`: Write the default config file.

use mathtutor_config::AppConfig;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let path = AppConfig::config_path();

    if AppConfig::write_default(&path)? {
        println!("Created config at: {}", path.display());
        println!();
        println!("Next steps:");
        println!("  1. Pick a provider and model under default_provider / default_model");
        println!("  2. Set [retrieval] backend = \"postgres\" and DATABASE_URL to use the textbook store");
        println!("  3. Run: mathtutor serve");
    } else {
        println!("Config already exists at: {}", path.display());
        println!("Edit it manually or delete it and re-run init.");
    }

    Ok(())
}
