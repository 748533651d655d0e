//! `mathtutor config`: Show the effective configuration.

use mathtutor_config::AppConfig;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("Config file: {}", AppConfig::config_path().display());

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    };

    let mut warnings = Vec::new();
    if !config.has_api_key() && config.default_provider != "ollama" {
        warnings.push("No API key set (set MATHTUTOR_API_KEY or OPENAI_API_KEY)");
    }
    if config.retrieval.backend == "postgres" && config.retrieval.database_url.is_none() {
        warnings.push("Postgres retrieval selected but no database_url / DATABASE_URL");
    }
    for w in &warnings {
        println!("   warning: {w}");
    }

    println!();
    println!("{config:#?}");

    Ok(())
}
