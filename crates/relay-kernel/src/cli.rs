//! Command line surface

use crate::plan::load_plan;
use anyhow::{Context, Result};
use clap::builder::PossibleValuesParser;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use relay_connectors::{default_dispatcher, HttpServiceClient};
use relay_core::{
    group_with_report, Complexity, Engine, ExecutionContext, LevelPlan, NotificationChannel,
    NotificationPriority, NotificationRequest, RelayConfig, Router, ServiceClient, Subtask,
    VERSION,
};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Build the `relay` command
#[must_use]
pub fn command() -> Command {
    Command::new("relay")
        .version(VERSION)
        .about("Execution and scheduling engine for multi-stage reasoning pipelines")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("levels")
                .about("Print the execution levels of a plan")
                .arg(
                    Arg::new("plan")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Plan file (JSON)"),
                ),
        )
        .subcommand(
            Command::new("route")
                .about("Print the service chain for a role")
                .arg(Arg::new("role").required(true).help("Pipeline role"))
                .arg(
                    Arg::new("complexity")
                        .long("complexity")
                        .value_parser(PossibleValuesParser::new(["low", "medium", "high"]))
                        .help("Also pick a tier alias for this complexity"),
                )
                .arg(
                    Arg::new("provider")
                        .long("provider")
                        .default_value("anthropic")
                        .help("Provider used with --complexity"),
                ),
        )
        .subcommand(
            Command::new("run")
                .about("Execute a plan and print the batch report")
                .arg(
                    Arg::new("plan")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Plan file (JSON)"),
                )
                .arg(
                    Arg::new("session")
                        .long("session")
                        .default_value("cli")
                        .help("Session id recorded on the run"),
                ),
        )
        .subcommand(
            Command::new("notify")
                .about("Send one notification")
                .arg(
                    Arg::new("channel")
                        .long("channel")
                        .required(true)
                        .value_parser(value_parser!(NotificationChannel))
                        .help("email, chat or webhook"),
                )
                .arg(
                    Arg::new("recipient")
                        .long("recipient")
                        .default_value("")
                        .help("Address, channel name or URL"),
                )
                .arg(Arg::new("subject").long("subject").required(true))
                .arg(Arg::new("body").long("body").required(true))
                .arg(
                    Arg::new("priority")
                        .long("priority")
                        .default_value("info")
                        .value_parser(PossibleValuesParser::new(["info", "warning", "critical"])),
                ),
        )
}

/// Load configuration from `path`, or defaults, then apply env overrides
///
/// # Errors
/// Returns an error if the file cannot be read or fails validation.
pub fn load_config(path: Option<&Path>) -> Result<RelayConfig> {
    let config = match path {
        Some(path) => RelayConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => RelayConfig::default(),
    };
    Ok(config.with_env_overrides())
}

/// Level grouping of a plan as JSON
#[must_use]
pub fn levels_report(subtasks: &[Subtask]) -> Value {
    let plan: LevelPlan = group_with_report(subtasks);
    json!({
        "levels": plan.id_levels(),
        "forced": plan.forced,
    })
}

/// Resolved service chain for a role as JSON
#[must_use]
pub fn route_report(router: &Router, role: &str) -> Value {
    let chain: Vec<Value> = router
        .chain_for_role(role)
        .iter()
        .map(|id| {
            let handle = router.resolve(id);
            json!({
                "requested": handle.requested(),
                "concrete": handle.concrete(),
                "provider": handle.provider(),
                "routable": handle.is_routable(),
            })
        })
        .collect();
    json!({ "role": role, "chain": chain })
}

/// Provider prefixes referenced by any configured chain
#[must_use]
pub fn referenced_providers(router: &Router, config: &RelayConfig) -> BTreeSet<String> {
    let services = &config.services;
    services
        .assignments
        .values()
        .chain(std::iter::once(&services.default_assignment))
        .flat_map(|assignment| assignment.chain())
        .map(|id| router.resolve(&id).provider().to_string())
        .collect()
}

/// Router with the HTTP client registered for every referenced provider
///
/// # Errors
/// Returns an error if the HTTP client cannot be configured.
pub fn http_router(config: &RelayConfig) -> Result<Router> {
    let router = Router::from_config(&config.services);
    let client: Arc<dyn ServiceClient> =
        Arc::new(HttpServiceClient::from_env().context("reasoning service is not configured")?);
    for provider in referenced_providers(&router, config) {
        router.register_provider(provider, Arc::clone(&client));
    }
    Ok(router)
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn priority(name: &str) -> NotificationPriority {
    match name {
        "critical" => NotificationPriority::Critical,
        "warning" => NotificationPriority::Warning,
        _ => NotificationPriority::Info,
    }
}

/// Run the selected subcommand
///
/// Returns `false` when the command completed but reported failure.
///
/// # Errors
/// Returns an error on bad input or missing connector configuration.
pub async fn execute(matches: &ArgMatches, config: RelayConfig) -> Result<bool> {
    match matches.subcommand() {
        Some(("levels", args)) => {
            let path = args.get_one::<PathBuf>("plan").context("plan path is required")?;
            let subtasks = load_plan(path)?;
            let report = levels_report(&subtasks);
            print_json(&report)?;
            Ok(report["forced"].is_null())
        }
        Some(("route", args)) => {
            let role = args.get_one::<String>("role").context("role is required")?;
            let router = Router::from_config(&config.services);
            let mut report = route_report(&router, role);
            if let Some(level) = args.get_one::<String>("complexity") {
                let complexity: Complexity = level.parse().map_err(anyhow::Error::msg)?;
                let provider = args
                    .get_one::<String>("provider")
                    .map_or("anthropic", String::as_str);
                report["selected"] = json!(router.select_by_complexity(complexity, provider));
            }
            print_json(&report)?;
            Ok(true)
        }
        Some(("run", args)) => {
            let path = args.get_one::<PathBuf>("plan").context("plan path is required")?;
            let session = args.get_one::<String>("session").map_or("cli", String::as_str);
            let subtasks = load_plan(path)?;

            let router = Arc::new(http_router(&config)?);
            let dispatcher = Arc::new(default_dispatcher()?);
            let engine = Engine::try_new(config, router, dispatcher)?;
            let ctx = ExecutionContext::new(session);

            info!(run_id = %ctx.run_id, subtasks = subtasks.len(), "Running plan");
            let report = engine.run_plan(&subtasks, &ctx).await;
            print_json(&serde_json::to_value(&report)?)?;
            Ok(report.all_succeeded())
        }
        Some(("notify", args)) => {
            let channel = *args
                .get_one::<NotificationChannel>("channel")
                .context("channel is required")?;
            let field = |name: &str| args.get_one::<String>(name).cloned().unwrap_or_default();
            let request =
                NotificationRequest::new(channel, field("recipient"), field("subject"), field("body"))
                    .with_priority(priority(&field("priority")));

            let dispatcher = default_dispatcher()?;
            let result = dispatcher.dispatch(&request).await;
            print_json(&serde_json::to_value(&result)?)?;
            Ok(result.success)
        }
        _ => anyhow::bail!("no subcommand given"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn command_definition_is_consistent() {
        command().debug_assert();
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let matches = command()
            .try_get_matches_from(["relay", "route", "agency", "--json-logs", "--config", "r.toml"])
            .unwrap();
        assert!(matches.get_flag("json-logs"));
        assert_eq!(
            matches.get_one::<PathBuf>("config"),
            Some(&PathBuf::from("r.toml"))
        );
    }

    #[test]
    fn notify_accepts_slack_alias() {
        let matches = command()
            .try_get_matches_from([
                "relay", "notify", "--channel", "slack", "--subject", "s", "--body", "b",
            ])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();
        assert_eq!(
            args.get_one::<NotificationChannel>("channel"),
            Some(&NotificationChannel::Chat)
        );
    }

    #[test]
    fn unknown_channel_is_rejected() {
        let result = command().try_get_matches_from([
            "relay", "notify", "--channel", "pager", "--subject", "s", "--body", "b",
        ]);
        assert!(result.is_err());
    }
}
