//! SkillTune CLI - inspect and approve adaptive tuning of skills.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use skilltune_core::{OptimizationRule, RuleKind, SkillId, SnapshotVersion};
use skilltune_evolution::ApplyOutcome;
use skilltune_execution::{LearningPass, ManualLearning, TuningContext};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "skilltune")]
#[command(about = "Adaptive tuning for repeatedly invoked skills", long_about = None)]
struct Cli {
    /// Data directory holding history, knowledge and snapshots
    #[arg(long, global = true, default_value = ".skilltune")]
    data_dir: PathBuf,

    /// Skill configuration document (.json, .yaml, .yml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Evolution configuration (YAML)
    #[arg(long, global = true)]
    evolution_config: Option<PathBuf>,

    /// Skill identifier
    #[arg(long, global = true)]
    skill: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show recorded executions
    History {
        /// Only the most recent N records
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Analyze the recent history
    Analyze,
    /// List stored best practices
    Practices,
    /// List stored optimization rules
    Rules,
    /// Run a learning pass now
    Learn,
    /// Apply the stored optimization rules to the configuration
    Apply,
    /// List configuration snapshots
    Snapshots,
    /// Restore the configuration from a snapshot
    Rollback {
        /// Snapshot version
        version: String,
    },
    /// Show evolution status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let skill = SkillId::new(cli.skill.as_deref().context("--skill is required")?)?;
    let ctx = TuningContext::open(&cli.data_dir, cli.evolution_config.as_deref()).await?;
    let config_path = || cli.config.clone().context("--config is required for this command");

    match cli.command {
        Commands::History { limit } => {
            let history = ctx.storage().load_history(&skill, limit).await?;

            println!("History of {} ({})", skill, history.len());
            for m in history {
                println!(
                    "  {} | {} | {:.2}s | quality {:.2} | {}",
                    m.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    if m.success { "OK  " } else { "FAIL" },
                    m.duration,
                    m.quality_score,
                    m.error_message.unwrap_or_default(),
                );
            }
        }
        Commands::Analyze => {
            let report = ctx.reflection().reflect_on(&skill).await?;
            let a = &report.analysis;

            println!("Analysis of {} ({} records)", skill, report.analyzed);
            println!("  Success rate: {:.1}%", a.success_rate * 100.0);
            println!("  Avg duration: {:.2}s", a.avg_duration);
            println!("  Avg quality: {:.2}", a.avg_quality_score);
            println!("  Confidence: {:.1}", a.confidence);
            println!("  Trend: {:?}", a.performance_trend.direction);
            for (name, value) in &a.optimal_parameters {
                println!("  Optimal: {} = {}", name, value);
            }
            for p in &a.failure_patterns {
                println!("  Failure: {} (x{}, {:.1}%)", p.error, p.count, p.frequency * 100.0);
            }
            for o in &a.improvement_opportunities {
                println!("  Opportunity: {:?} {:.2} -> {:.2}: {}", o.kind, o.current, o.target, o.suggestion);
            }
        }
        Commands::Practices => {
            let practices = ctx.storage().load_best_practices(&skill).await?;

            println!("Best practices ({})", practices.len());
            for p in practices {
                println!(
                    "  {} | gain {:+.2} | applied {} | {}",
                    p.id, p.expected_gain, p.times_applied, p.description
                );
            }
        }
        Commands::Rules => {
            let rules = ctx.storage().load_optimization_rules(&skill).await?;

            println!("Optimization rules ({})", rules.len());
            for rule in &rules {
                println!("  {}", format_rule(rule));
            }
        }
        Commands::Learn => {
            let pass = LearningPass::new(ctx.clone(), skill.clone(), config_path()?).await?;

            match pass.run_manual().await? {
                ManualLearning::Completed(summary) => {
                    println!("Learned from {} records", summary.analyzed);
                    println!("  Confidence: {:.1}", summary.confidence);
                    println!("  Best practices: {}", summary.practices);
                    println!("  Optimization rules: {}", summary.rules);
                    if let Some(outcome) = &summary.apply {
                        print_outcome(outcome);
                    }
                }
                ManualLearning::InsufficientData { count } => {
                    println!("Not enough history to learn from ({} records)", count);
                }
                ManualLearning::Disabled => println!("Evolution is disabled"),
            }
        }
        Commands::Apply => {
            let adapter = ctx.adapter(&skill, config_path()?)?;
            let rules = ctx.storage().load_optimization_rules(&skill).await?;
            if rules.is_empty() {
                println!("No optimization rules to apply");
                return Ok(());
            }

            let outcome = adapter.apply_optimizations(rules, true).await?;
            print_outcome(&outcome);
        }
        Commands::Snapshots => {
            let snapshots = ctx.storage().list_snapshots(&skill).await?;

            println!("Snapshots ({})", snapshots.len());
            for s in snapshots {
                println!("  {} | {} | {} bytes", s.version, s.created_at.format("%Y-%m-%d %H:%M:%S"), s.size_bytes);
            }
        }
        Commands::Rollback { version } => {
            let version: SnapshotVersion = version.parse()?;
            let adapter = ctx.adapter(&skill, config_path()?)?;

            if adapter.rollback_to(version).await? {
                println!("Rolled back {} to {}", skill, version);
            } else {
                anyhow::bail!("Snapshot {} not found", version);
            }
        }
        Commands::Status => {
            let status = ctx.evolution_status(&skill).await?;

            println!("SkillTune status of {}", skill);
            println!("  Enabled: {}", status.enabled);
            println!("  Executions: {}", status.total_executions);
            println!("  Best practices: {}", status.best_practices_count);
            println!("  Optimization rules: {}", status.optimization_rules_count);
            println!("  Snapshots: {}", status.snapshots_count);
            if let Some(latest) = status.latest_snapshot {
                println!("  Latest snapshot: {}", latest.version);
            }
        }
    }

    info!("Done");
    Ok(())
}

fn format_rule(rule: &OptimizationRule) -> String {
    let change = match &rule.kind {
        RuleKind::Parameter { target, value, .. } => format!("{} = {}", target, value),
        RuleKind::Config { target, action, value } => format!("{} {} {}", action.as_str(), target, value),
    };
    format!("{} | {} | {} | confidence {:.1}", rule.id, rule.label(), change, rule.confidence)
}

fn print_outcome(outcome: &ApplyOutcome) {
    match outcome {
        ApplyOutcome::Pending { rules } => {
            println!("{} rules awaiting approval", rules.len());
        }
        ApplyOutcome::Processed(report) => {
            println!("Applied: {}", report.applied);
            if let Some(version) = report.snapshot_version {
                println!("  Snapshot: {}", version);
            }
            for change in &report.changes {
                println!(
                    "  {} | {}: {} -> {}",
                    change.rule_id,
                    change.target,
                    change.previous.as_ref().map(ToString::to_string).unwrap_or_else(|| "-".into()),
                    change.value.as_ref().map(ToString::to_string).unwrap_or_else(|| "-".into()),
                );
            }
            if !report.unchanged_rule_ids.is_empty() {
                println!("  Already in effect: {}", report.unchanged_rule_ids.join(", "));
            }
            if !report.failed_rule_ids.is_empty() {
                println!("  Failed: {}", report.failed_rule_ids.join(", "));
            }
        }
    }
}
