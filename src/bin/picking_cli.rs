use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use order_picking::{
    config::{self, AppConfig},
    db::{self, DbPool},
    events::{self, EventSender},
    models::{BatchUsage, Grams},
    repositories::{BatchUsageRepository, OrderRepository},
    services::{BatchUsageLedger, CompletedOrderReport, PickingService},
};
use serde::Serialize;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize().await?;

    match cli.command {
        Commands::Migrate => {
            db::run_migrations(&context.db)
                .await
                .context("failed to run migrations")?;
            println!("Migrations applied");
        }
        Commands::Summary { order } => {
            let report = context
                .service
                .completed_order_report(order)
                .await
                .context("failed to build order summary")?;
            if cli.json {
                print_json(&report)?;
            } else {
                render_summary(&report);
            }
        }
        Commands::BatchUsage { batch, product } => {
            let usages = match product {
                Some(product) => context
                    .service
                    .ledger()
                    .usage(&batch, product)
                    .await?
                    .into_iter()
                    .collect(),
                None => context.service.ledger().usages_for_batch(&batch).await?,
            };
            if cli.json {
                print_json(&usages)?;
            } else if usages.is_empty() {
                println!("No usage recorded for batch {}", batch);
            } else {
                usages.iter().for_each(render_usage);
            }
        }
        Commands::Missing { order } => {
            let items = context.service.missing_items_for_order(order).await?;
            if cli.json {
                print_json(&items)?;
            } else if items.is_empty() {
                println!("Order {} has no missing items", order);
            } else {
                for item in &items {
                    println!(
                        "- product {} • {} missing • {} • reported {}",
                        item.product_id, item.quantity, item.status, item.date
                    );
                }
            }
        }
        Commands::RecordUsage { order } => {
            let usages = context
                .service
                .record_batch_usage_for_order(order)
                .await
                .context("failed to record batch usage")?;
            if cli.json {
                print_json(&usages)?;
            } else {
                println!("Recorded {} batch usage entries", usages.len());
            }
        }
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "picking", about = "Inspect picking orders, shortages and batch usage", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply database migrations
    Migrate,
    /// Product and batch summary of an order
    Summary {
        #[arg(long)]
        order: Uuid,
    },
    /// Cross-order consumption of a batch
    BatchUsage {
        #[arg(long)]
        batch: String,
        #[arg(long)]
        product: Option<Uuid>,
    },
    /// Shortages recorded for an order
    Missing {
        #[arg(long)]
        order: Uuid,
    },
    /// Re-record the batch usage of a completed order
    RecordUsage {
        #[arg(long)]
        order: Uuid,
    },
}

struct CliContext {
    db: Arc<DbPool>,
    service: PickingService,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config: AppConfig = config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let db_pool = db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?;
        let db = Arc::new(db_pool);
        if config.auto_migrate {
            db::run_migrations(&db).await.context("failed to run migrations")?;
        }

        let (event_sender, event_rx) = EventSender::channel(config.event_channel_capacity);
        let event_sender = Arc::new(event_sender);
        tokio::spawn(events::process_events(event_rx));

        let ledger = BatchUsageLedger::new(
            Arc::new(BatchUsageRepository::new(db.clone())),
            config.picking.idempotent_batch_usage,
        )
        .with_event_sender(event_sender.clone());
        let service = PickingService::new(
            Arc::new(OrderRepository::new(db.clone())),
            Arc::new(ledger),
            config.picking.clone(),
        )
        .with_event_sender(event_sender);

        Ok(Self { db, service })
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn kg(weight: Grams) -> String {
    format!("{} kg", weight.kilograms())
}

fn render_summary(report: &CompletedOrderReport) {
    println!("Order {} • {}", report.order_number, report.status);
    for row in &report.product_summary.rows {
        println!(
            "- {} • qty {} • {}",
            row.product_name,
            row.quantity,
            kg(row.weight)
        );
    }
    println!(
        "Total • qty {} • {}",
        report.product_summary.total_quantity,
        kg(report.product_summary.total_weight)
    );
    for batch in &report.batch_summary {
        println!("- batch {} • {}", batch.batch_number, kg(batch.total_weight));
    }
    if report.total_missing > 0 {
        println!("Missing units: {}", report.total_missing);
    }
}

fn render_usage(usage: &BatchUsage) {
    println!(
        "- batch {} • product {} • used {} of {} • {} orders • last used {}",
        usage.batch_number,
        usage.product_id,
        kg(usage.used_weight),
        kg(usage.total_weight),
        usage.orders_count,
        usage.last_used
    );
}
