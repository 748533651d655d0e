//! `mathtutor topics`: Print the topic table.

use mathtutor_config::AppConfig;
use mathtutor_tutor::TopicFilterRegistry;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let registry = TopicFilterRegistry::from_config(&config.topics);

    println!("Topics ({}):", registry.len());
    for topic in registry.topics() {
        println!();
        println!("  {}", topic.name);
        if !topic.definition.is_empty() {
            println!("    {}", topic.definition);
        }
        for scope in &topic.scopes {
            println!(
                "    - {} pp. {}–{}",
                scope.source_id, scope.page_min, scope.page_max
            );
        }
    }

    Ok(())
}
