use std::fs;

use anyhow::Result;
use clap::{Parser, Subcommand};
use sea_orm::DatabaseConnection;
use tracing::info;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use plantree::database::{
    establish_connection, get_database_url, migrate_database, seed_data, MigrateDirection,
};
use plantree::services::PlanItemService;
use plantree::tree::PlanTreeNode;

#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    #[clap(short, long, global = true)]
    log_level: Option<String>,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database management
    Db {
        #[clap(subcommand)]
        command: DbCommands,
    },
    /// Seed system item types and an example project
    Seed {
        #[clap(short, long, default_value = "plantree.db")]
        database: String,
    },
    /// Print the CSV import template
    Template {
        #[clap(short, long, default_value = "plantree.db")]
        database: String,
        /// Use this organization's type chain instead of the system set
        #[clap(short, long)]
        organization: Option<i32>,
    },
    /// Parse a CSV and report rows and errors without importing
    Preview {
        #[clap(short, long)]
        project: i32,
        #[clap(short, long)]
        file: String,
        #[clap(short, long, default_value = "plantree.db")]
        database: String,
    },
    /// Import a CSV into a project's plan tree
    Import {
        #[clap(short, long)]
        project: i32,
        #[clap(short, long)]
        file: String,
        #[clap(short, long, default_value = "plantree.db")]
        database: String,
        /// Recorded on history entries written by this import
        #[clap(long)]
        email: Option<String>,
    },
    /// Render a project's plan tree
    Tree {
        #[clap(short, long)]
        project: i32,
        #[clap(short, long, default_value = "plantree.db")]
        database: String,
    },
}

#[derive(Subcommand, Debug)]
enum DbCommands {
    Init {
        #[clap(short, long, default_value = "plantree.db")]
        database: String,
    },
    Migrate {
        #[clap(subcommand)]
        direction: MigrateDirection,
        #[clap(short, long, default_value = "plantree.db")]
        database: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    setup_logging(&args.log_level);

    match args.command {
        Commands::Db { command } => match command {
            DbCommands::Init { database } => {
                info!("Initializing database: {}", database);
                migrate_database(&database, MigrateDirection::Up).await?;
            }
            DbCommands::Migrate {
                direction,
                database,
            } => {
                info!("Running database migration: {:?}", direction);
                migrate_database(&database, direction).await?;
            }
        },
        Commands::Seed { database } => {
            migrate_database(&database, MigrateDirection::Up).await?;
            let db = connect(&database).await?;
            seed_data::create_example_project(&db).await?;
        }
        Commands::Template {
            database,
            organization,
        } => {
            let db = connect(&database).await?;
            let service = PlanItemService::new(db);
            let template = service.get_csv_template(organization).await?;
            print!("{}", template);
        }
        Commands::Preview {
            project,
            file,
            database,
        } => {
            let csv_text = fs::read_to_string(&file)?;
            let db = connect(&database).await?;
            let service = PlanItemService::new(db);
            let parsed = service.preview_import(project, &csv_text).await?;
            println!("{}", serde_json::to_string_pretty(&parsed)?);
        }
        Commands::Import {
            project,
            file,
            database,
            email,
        } => {
            info!("Importing {} into project {}", file, project);
            let csv_text = fs::read_to_string(&file)?;
            let db = connect(&database).await?;
            let service = PlanItemService::new(db);
            let summary = service
                .import_plan_items(project, &csv_text, None, email.as_deref())
                .await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Tree { project, database } => {
            let db = connect(&database).await?;
            let service = PlanItemService::new(db);
            let tree = service.get_plan_tree(project).await?;
            print_tree(&tree, 0);
        }
    }

    Ok(())
}

async fn connect(database_path: &str) -> Result<DatabaseConnection> {
    let database_url = get_database_url(Some(database_path));
    Ok(establish_connection(&database_url).await?)
}

fn print_tree(nodes: &[PlanTreeNode], depth: usize) {
    for node in nodes {
        let indent = "  ".repeat(depth);
        match &node.item.owner {
            Some(owner) => println!(
                "{}{} [{}] ({})",
                indent, node.item.name, node.item.status, owner
            ),
            None => println!("{}{} [{}]", indent, node.item.name, node.item.status),
        }
        print_tree(&node.children, depth + 1);
    }
}

fn setup_logging(log_level: &Option<String>) {
    let log_level = match log_level
        .as_ref()
        .unwrap_or(&"info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(format!("sqlx=warn,{}", log_level)))
        .without_time()
        .init();
}
