use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use outreach_rs::outreach::crm::{LeadStore, Outbox, SentEmail};
use outreach_rs::outreach::research::normalize_identifier;
use outreach_rs::outreach::server::{self, AppState};
use outreach_rs::outreach::{Engine, FinalResult, Settings};

use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML settings file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Research a company, draft an email and record the send
    Run {
        /// Company domain, e.g. acme.io
        #[arg(short, long)]
        domain: String,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the HTTP API
    Serve {
        /// Overrides the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Inspect or remove leads
    Leads {
        #[command(subcommand)]
        action: LeadsCommand,
    },
    /// List recorded emails
    Emails {
        /// Only emails for this lead
        #[arg(long)]
        lead: Option<i64>,

        #[arg(long, default_value_t = 0)]
        skip: u32,

        #[arg(long, default_value_t = 100)]
        limit: u32,
    },
}

#[derive(Subcommand, Debug)]
enum LeadsCommand {
    /// List leads, newest first
    List {
        #[arg(long, default_value_t = 0)]
        skip: u32,

        #[arg(long, default_value_t = 100)]
        limit: u32,
    },
    /// Show one lead
    Get { id: i64 },
    /// Delete a lead (its emails are kept)
    Delete { id: i64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let args = Args::parse();

    if matches!(args.command, Commands::Serve { .. }) {
        init_tracing();
    } else {
        env_logger::init();
    }

    let settings = Settings::load(args.config.as_deref()).context("loading settings")?;
    let crm = settings
        .open_crm()
        .with_context(|| format!("opening {}", settings.database.display()))?;

    match args.command {
        Commands::Run { domain, json } => {
            let Some(identifier) = normalize_identifier(&domain) else {
                bail!("--domain must not be empty");
            };

            let engine = Engine::new(settings.collaborators(crm)?);
            let result = engine.run(&identifier).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_result(&result);
            }
        }
        Commands::Serve { port } => {
            let port = port.unwrap_or(settings.port);
            let state = AppState {
                engine: Arc::new(Engine::new(settings.collaborators(crm.clone())?)),
                leads: crm.clone(),
                outbox: crm,
            };
            server::serve(state, port).await?;
        }
        Commands::Leads { action } => match action {
            LeadsCommand::List { skip, limit } => {
                let leads = LeadStore::list(crm.as_ref(), skip, limit).await?;
                if leads.is_empty() {
                    println!("No leads");
                }
                for lead in leads {
                    println!(
                        "{:>5}  {:<30}  {:<24}  updated {}",
                        lead.id,
                        lead.company_domain,
                        lead.company_name,
                        lead.updated_at.format("%Y-%m-%d %H:%M")
                    );
                }
            }
            LeadsCommand::Get { id } => {
                let lead = crm.get(id).await?;
                println!("{}", serde_json::to_string_pretty(&lead)?);
            }
            LeadsCommand::Delete { id } => {
                crm.delete(id).await?;
                println!("Deleted lead {}", id);
            }
        },
        Commands::Emails { lead, skip, limit } => {
            let emails = match lead {
                Some(lead_id) => crm.list_for_lead(lead_id).await?,
                None => Outbox::list(crm.as_ref(), skip, limit).await?,
            };
            if emails.is_empty() {
                println!("No emails");
            }
            for email in &emails {
                print_email(email);
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn print_result(result: &FinalResult) {
    let facts = &result.research_facts;
    println!("Company:  {} ({})", facts.company_name, result.company_identifier);
    println!("Industry: {}", facts.industry);
    println!("Lead:     #{}", result.lead_record.id);
    if result.draft_origin.is_canned() {
        println!("Draft:    canned template");
    }
    println!("Sent at:  {}", result.send_result.sent_at.to_rfc3339());
    println!();
    println!("Subject: {}", result.draft.subject);
    println!();
    println!("{}", result.draft.body);
}

fn print_email(email: &SentEmail) {
    let when = email
        .sent_at
        .unwrap_or(email.created_at)
        .format("%Y-%m-%d %H:%M");
    println!(
        "{:>5}  lead {:<5}  {:<6}  {}  {}",
        email.id,
        email.lead_id,
        email.status.as_str(),
        when,
        email.subject
    );
}
