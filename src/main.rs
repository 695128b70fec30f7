use anyhow::Result;
use log::info;

use storyloom::agent::StoryAgent;
use storyloom::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = if std::path::Path::new("config.yml").exists() {
        Config::load()?
    } else {
        info!("config.yml not found, using defaults");
        Config::default()
    };

    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.iter().any(|a| a == "--check") {
        let agent = StoryAgent::new(config)?;
        agent.check_connection().await?;
        println!("Backend connection OK.");
        return Ok(());
    }

    let topic = match args.into_iter().find(|a| !a.starts_with("--")) {
        Some(topic) => topic,
        None => inquire::Text::new("Story topic:").prompt()?,
    };

    let agent = StoryAgent::new(config)?;
    let scenes = agent.generate_story(&topic).await?;

    for scene in &scenes {
        println!("{scene}\n");
    }
    info!("generated {} scenes", scenes.len());

    Ok(())
}
