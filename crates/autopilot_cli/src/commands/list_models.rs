//! List-models command.

use anyhow::{Context, Result};
use clap::Args;

use autopilot_services::GeminiClassifier;

use crate::config::{self, Env};

#[derive(Args, Debug)]
pub struct ListModelsArgs {
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: ListModelsArgs) -> Result<()> {
    let env = Env::from_process();
    let classifier = GeminiClassifier::new(config::gemini_config(&env)?);

    let models = classifier
        .list_models()
        .await
        .context("Failed to list Gemini models")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&models)?);
        return Ok(());
    }

    println!("Models supporting generateContent:\n");
    for model in &models {
        match &model.display_name {
            Some(display) => println!("  {}  ({})", model.name, display),
            None => println!("  {}", model.name),
        }
    }
    println!("\nSet GEMINI_MODEL to use one of these (current: {}).", classifier.model());

    Ok(())
}
