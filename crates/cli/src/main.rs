use std::{path::Path, sync::Arc, time::Duration};

use anyhow::{Context, Result, bail};
use clap::{Arg, ArgAction, ArgMatches, Command};
use jalan_engine::{
    ChannelObserver, DependencyEntry, HandlerDefinition, NO_DEPENDENCIES, OutputStore, StepManifest, WorkflowHandler,
    load_config, load_config_from_path,
};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let matches = cli().get_matches();

    match matches.subcommand() {
        Some(("plan", sub)) => run_plan_cmd(sub),
        Some(("demo", sub)) => run_demo_cmd(sub).await,
        _ => {
            println!("Available subcommands: plan, demo");
            Ok(())
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .try_init();
}

/// `RUST_LOG` when set and valid, otherwise `info`.
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn cli() -> Command {
    Command::new("jalan")
        .about("Compile and drive ordered workflow steps")
        .subcommand(
            Command::new("plan")
                .about("Validate a step manifest and print its ordered plans")
                .arg(
                    Arg::new("manifest")
                        .long("manifest")
                        .short('m')
                        .required(true)
                        .action(ArgAction::Set)
                        .help("Path to the step manifest YAML"),
                )
                .arg(
                    Arg::new("provide")
                        .long("provide")
                        .short('p')
                        .action(ArgAction::Append)
                        .help("Dependency token available at compile time (repeatable)"),
                ),
        )
        .subcommand(
            Command::new("demo")
                .about("Run the built-in release workflow and print its final state")
                .arg(
                    Arg::new("fail-at")
                        .long("fail-at")
                        .action(ArgAction::Set)
                        .help("Key of a step or teardown step that should fail"),
                )
                .arg(
                    Arg::new("continue-on-failure")
                        .long("continue-on-failure")
                        .action(ArgAction::SetTrue)
                        .help("Report main-step failures without stopping the run"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .short('c')
                        .action(ArgAction::Set)
                        .help("Controller configuration YAML (defaults to JALAN_CONFIG_PATH or the user config dir)"),
                ),
        )
}

/// Handler for manifests checked by `plan`; nothing is ever invoked on it.
struct ManifestOnly;

impl WorkflowHandler for ManifestOnly {}

fn run_plan_cmd(matches: &ArgMatches) -> Result<()> {
    let path = matches
        .get_one::<String>("manifest")
        .context("--manifest is required")?;
    let manifest = StepManifest::load(path)?;
    let handler = manifest
        .handler
        .clone()
        .unwrap_or_else(|| Path::new(path).file_stem().map(|stem| stem.to_string_lossy().into_owned()).unwrap_or_default());
    let provided = matches
        .get_many::<String>("provide")
        .into_iter()
        .flatten()
        .map(|token| DependencyEntry::provide(token.clone(), || ()));

    let definition = HandlerDefinition::<ManifestOnly>::builder(handler)
        .dependencies(provided)
        .manifest(&manifest)
        .build()?;
    let controller = definition.compile(ManifestOnly, Vec::new())?;

    let plan = json!({
        "handler": controller.name(),
        "steps": controller.main_plan(),
        "teardown": controller.teardown_plan(),
    });
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

async fn run_demo_cmd(matches: &ArgMatches) -> Result<()> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => load_config_from_path(Path::new(path))?,
        None => load_config()?,
    };
    if matches.get_flag("continue-on-failure") {
        config.continue_on_step_failure = true;
    }

    let handler = DemoRelease {
        fail_at: matches.get_one::<String>("fail-at").cloned(),
        outputs: OutputStore::new(),
    };
    let (observer, mut events) = ChannelObserver::channel();
    let mut controller = demo_definition()?
        .compile_with(handler, Vec::new(), config)?
        .with_observer(Arc::new(observer));

    let outcome = controller.start().await;
    info!(stopped = outcome.is_stopped(), "demo run complete");

    while let Ok(event) = events.try_recv() {
        println!("{}", serde_json::to_string(&event)?);
    }
    println!("{}", serde_json::to_string_pretty(controller.state())?);
    Ok(())
}

/// A small release pipeline with simulated work.
struct DemoRelease {
    fail_at: Option<String>,
    outputs: OutputStore,
}

impl DemoRelease {
    async fn work(&self, key: &str, millis: u64) -> Result<()> {
        tokio::time::sleep(Duration::from_millis(millis)).await;
        if self.fail_at.as_deref() == Some(key) {
            bail!("{key} failed on request");
        }
        Ok(())
    }
}

impl WorkflowHandler for DemoRelease {
    fn output_store(&self) -> Option<&OutputStore> {
        Some(&self.outputs)
    }
}

fn demo_definition() -> Result<HandlerDefinition<DemoRelease>> {
    let definition = HandlerDefinition::<DemoRelease>::builder("release")
        .dependency(DependencyEntry::provide("repository", || "https://example.com/jalan/demo.git".to_string()))
        .dependency(DependencyEntry::provide("toolchain", || "stable".to_string()))
        .dependency(DependencyEntry::provide("registry", || "registry.example.com".to_string()))
        .step(1, "checkout", ["repository"], |handler: Arc<DemoRelease>, deps| async move {
            let repository = deps.get::<String>(0)?;
            handler.work("checkout", 20).await?;
            Ok(json!({ "repository": repository.as_str(), "revision": "4f2c9e1" }))
        })
        .step(2, "build", ["toolchain"], |handler: Arc<DemoRelease>, deps| async move {
            let toolchain = deps.get::<String>(0)?;
            let checkout = handler.outputs.get_output("checkout")?;
            handler.work("build", 60).await?;
            Ok(json!({ "artifact": format!("demo-{}.tar.gz", checkout["revision"].as_str().unwrap_or("dev")), "toolchain": toolchain.as_str() }))
        })
        .step(3, "test", NO_DEPENDENCIES, |handler: Arc<DemoRelease>, _| async move {
            handler.work("test", 40).await?;
            Ok(json!({ "passed": 12 }))
        })
        .step(4, "publish", ["registry"], |handler: Arc<DemoRelease>, deps| async move {
            let registry = deps.get::<String>(0)?;
            let build = handler.outputs.get_output("build")?;
            handler.work("publish", 30).await?;
            Ok(json!({ "location": format!("{}/{}", registry, build["artifact"].as_str().unwrap_or_default()) }))
        })
        .teardown(1, "remove_workspace", NO_DEPENDENCIES, |handler: Arc<DemoRelease>, _| async move {
            handler.work("remove_workspace", 10).await?;
            Ok(json!(null))
        })
        .teardown(2, "release_lock", NO_DEPENDENCIES, |handler: Arc<DemoRelease>, _| async move {
            handler.work("release_lock", 5).await?;
            Ok(json!(null))
        })
        .build()?;
    Ok(definition)
}

#[cfg(test)]
mod tests {
    use tracing::Level;

    use super::*;

    fn with_filter_from_env(rust_log: Option<&str>, check: impl FnOnce()) {
        temp_env::with_var("RUST_LOG", rust_log, || {
            let subscriber = tracing_subscriber::fmt().with_env_filter(env_filter()).finish();
            tracing::subscriber::with_default(subscriber, check);
        });
    }

    #[test]
    fn rust_log_can_raise_the_threshold() {
        with_filter_from_env(Some("warn"), || {
            assert!(!tracing::enabled!(Level::INFO));
            assert!(tracing::enabled!(Level::WARN));
        });
    }

    #[test]
    fn rust_log_can_enable_debug_output() {
        with_filter_from_env(Some("debug"), || {
            assert!(tracing::enabled!(Level::DEBUG));
            assert!(!tracing::enabled!(Level::TRACE));
        });
    }

    #[test]
    fn filter_defaults_to_info() {
        with_filter_from_env(None, || {
            assert!(tracing::enabled!(Level::INFO));
            assert!(!tracing::enabled!(Level::DEBUG));
        });
    }
}
