use flag_engine::{
    ConstraintRegistry, Engine, EngineConfig, Entity, FlagDefinition, FlagRepository,
    InMemoryFlagRepository, JsonFileFlagRepository, JsonLinesResultLogger, NoopResultLogger,
    RefreshScheduler, ResultLogger,
};
use serde_json::json;
use std::{path::PathBuf, sync::Arc};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn sample_definition() -> Result<FlagDefinition, serde_json::Error> {
    serde_json::from_value(json!({
        "tags": ["checkout"],
        "description": "Color of the checkout button",
        "flag": "checkout.button.color",
        "segments": [
            {
                "description": "Canadian users in the first half of the rollout",
                "constraints": {
                    "A": {"name": "contains", "parameters": {"values": ["CA"], "property": "country"}},
                    "B": {"name": "rollout", "parameters": {"lower_bound": 0, "upper_bound": 49}}
                },
                "expression": "A ∩ B",
                "variant": {"variant_key": "green", "variant_attachment": {"hex_color": "#42b983"}}
            },
            {
                "description": "Everyone but the test accounts",
                "constraints": {
                    "A": {"name": "match", "parameters": {"expresion": "^test-", "property": "email"}}
                },
                "expression": "¬A",
                "variant": {"variant_key": "blue", "variant_attachment": {"hex_color": "#1e90ff"}}
            }
        ]
    }))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = EngineConfig::load(config_path.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_filter))
        .init();

    let repository: Arc<dyn FlagRepository> = match &config.flags_path {
        Some(path) => Arc::new(JsonFileFlagRepository::new(path)),
        None => {
            let definition = sample_definition()?;
            definition.validate(&ConstraintRegistry::default())?;
            let flag = definition.into_flag(1, chrono::Utc::now())?;
            Arc::new(InMemoryFlagRepository::new(vec![flag]))
        }
    };

    let (logger, writer): (Arc<dyn ResultLogger>, _) = if config.evaluation_log.enabled {
        let (logger, handle) =
            JsonLinesResultLogger::open(&config.evaluation_log.path, config.evaluation_log.capacity)
                .await?;
        (Arc::new(logger), Some(handle))
    } else {
        (Arc::new(NoopResultLogger), None)
    };

    let engine = Arc::new(Engine::new(repository, logger));
    let scheduler = RefreshScheduler::new(engine.clone(), &config.refresh_schedule)?;
    let summary = scheduler.tick().await?;
    info!(flags = summary.flags, "initial fetch done");
    scheduler.start().await;

    let entities = [
        Entity::new(42, "user").with_context("country", "CA"),
        Entity::new(77, "user").with_context("country", "CA"),
        Entity::new(3, "user").with_context("email", "test-3@example.com"),
    ];
    for result in engine.evaluate_batch(&["checkout.button.color"], &entities)? {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }

    scheduler.shutdown().await;
    drop(scheduler);
    drop(engine);
    if let Some(writer) = writer {
        writer.await?;
    }

    Ok(())
}
