use anyhow::{bail, Context, Result};
use colored::Colorize;
use orderloader::navigation::{DryRunNavigator, NavigationEngine, Navigator};
use orderloader::queue::{Outcome, PassSummary, QueueProcessor, QueueStatus};
use orderloader::{
    create_service, AutomationError, BackupManager, Config, OrderDocument, QueueStore,
    TemplateCatalog, ThreadSleeper,
};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::cli::{RunArgs, ValidateArgs};

pub fn print_queue_status(status: &QueueStatus) {
    println!("\n{}", "Queue status".bold());
    println!("   Pending:         {}", status.pending.to_string().yellow());
    println!("   Completed:       {}", status.completed.to_string().green());
    println!("   Total processed: {}", status.total_processed);
}

fn open_store(config: &Config) -> Result<QueueStore> {
    QueueStore::open(&config.queue.root)
        .with_context(|| format!("Failed to open queue at {}", config.queue.root.display()))
}

/// Print missing required templates. Returns true when none are missing.
pub fn handle_check_templates(config: &Config) -> Result<bool> {
    let catalog = TemplateCatalog::from_config(&config.templates, config.recognition.confidence);
    let missing = catalog.missing();
    if missing.is_empty() {
        println!(
            "{} All required templates present under {}",
            "✓".green(),
            catalog.root().display()
        );
        return Ok(true);
    }
    println!("{} Missing reference templates:", "✗".red());
    for template in &missing {
        println!("   - {} ({})", template.name.bold(), template.path.display());
    }
    Ok(false)
}

pub fn handle_status(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    print_queue_status(&store.status()?);
    Ok(())
}

pub fn handle_validate(args: &ValidateArgs) -> Result<bool> {
    match OrderDocument::load(&args.file) {
        Ok(doc) => {
            println!(
                "{} {} is valid: order {} for {} with {} items",
                "✓".green(),
                args.file.display(),
                doc.order_id.to_string().bold(),
                doc.buyer.name,
                doc.items.len()
            );
            Ok(true)
        }
        Err(AutomationError::Validation(v)) => {
            println!(
                "{} {} is invalid: {} {}",
                "✗".red(),
                args.file.display(),
                v.field.bold(),
                v.message
            );
            Ok(false)
        }
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", args.file.display())),
    }
}

fn print_summary(summary: &PassSummary) {
    for result in &summary.results {
        let name = result.item.file_name();
        match &result.outcome {
            Outcome::Completed { destination } => println!(
                "   {} {} -> {} ({:.1}s)",
                "✓".green(),
                name,
                destination.display(),
                result.duration.as_secs_f64()
            ),
            Outcome::Validated => println!("   {} {} valid", "✓".green(), name),
            Outcome::Rejected(v) => println!("   {} {} rejected: {}", "✗".red(), name, v),
            Outcome::Failed(msg) => println!("   {} {} failed: {}", "✗".red(), name, msg),
        }
        if let Some(report) = &result.report {
            if !report.unconfirmed.is_empty() && !matches!(result.outcome, Outcome::Validated) {
                println!(
                    "     {} unconfirmed steps: {:?}",
                    "!".yellow(),
                    report.unconfirmed
                );
            }
        }
    }

    let m = &summary.metrics;
    println!(
        "\n{} {} processed, {} succeeded, {} failed, {} retries ({:.0}% success)",
        "Summary:".bold(),
        m.total_processed,
        m.success_count.to_string().green(),
        m.failure_count.to_string().red(),
        m.retry_count,
        m.success_rate() * 100.0
    );
}

fn run_pass<N: Navigator>(mut processor: QueueProcessor<N>) -> Result<bool> {
    let summary = processor
        .process_pass()
        .context("Queue processing aborted")?;
    print_summary(&summary);
    print_queue_status(&processor.store().status()?);
    Ok(summary.failed() == 0)
}

/// Returns true when every document succeeded.
pub fn handle_run(config: &Config, args: &RunArgs, log_dir: &Path) -> Result<bool> {
    let store = open_store(config)?;
    if !store.has_pending()? {
        println!("No pending documents in {}", store.pending_dir().display());
        return Ok(true);
    }
    print_queue_status(&store.status()?);

    let templates_ok = handle_check_templates(config)?;
    if args.dry_run {
        println!("{}", "Dry run: documents are validated only".yellow());
        let processor = QueueProcessor::new(store, DryRunNavigator).dry_run(true);
        return run_pass(processor);
    }
    if !templates_ok {
        bail!("Add the missing templates before running the automation");
    }

    println!(
        "{}",
        "Starting automation. Move the pointer to the top-left corner to abort.".cyan()
    );
    let service = create_service(config.input.clone())?;
    let engine = NavigationEngine::new(service, config, Arc::new(ThreadSleeper));
    let backups_dir = store.backups_dir().to_path_buf();
    let mut processor = QueueProcessor::new(store, engine)
        .with_metrics_path(config.queue.metrics_path());
    if config.queue.backup_enabled {
        processor = processor.with_backups(BackupManager::new(
            backups_dir,
            config.queue.compress_backups,
            config.queue.max_backups,
        ));
    }

    let ok = run_pass(processor)?;
    if ok {
        println!("{}", "✅ Processing completed successfully".green());
    } else {
        println!("{}", "❌ Some documents failed and remain in pending".red());
        println!("   See the logs in {}", log_dir.display());
    }
    info!("Run finished, all succeeded: {}", ok);
    Ok(ok)
}
