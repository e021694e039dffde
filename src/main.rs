//! Operator CLI for url-metering.
//!
//! Drives the metering services against PostgreSQL without an HTTP layer.
//!
//! # Usage
//!
//! ```bash
//! # Apply migrations and create the first admin
//! cargo run -- db migrate
//! cargo run -- account create-admin
//!
//! # Publish a pricing plan as an admin
//! cargo run -- --caller <ADMIN_ID> --admin pricing publish --free-urls 3 --free-visits 10 \
//!     --price-per-url 4.00 --price-per-visit 2.00
//!
//! # Open an account and top it up
//! cargo run -- account open
//! cargo run -- --caller <ID> account credit <ID> 25.00
//!
//! # Shorten and follow a URL
//! cargo run -- --caller <ID> url create https://example.com/docs
//! cargo run -- url redirect <CODE>
//! ```
//!
//! # Environment Variables
//!
//! See [`url_metering::config`]. `DATABASE_URL` (or the `DB_*` components) is required.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use dialoguer::Confirm;
use rust_decimal::Decimal;
use uuid::Uuid;

use url_metering::bootstrap;
use url_metering::config;
use url_metering::domain::Caller;
use url_metering::domain::entities::{Account, LedgerEntry, NewPricingPlan, PricingPlan, ShortUrl};
use url_metering::application::services::{AccountFilter, MonthlyReport};
use url_metering::domain::store::{Page, Pagination};
use url_metering::error::AppError;
use url_metering::infrastructure::persistence::PgStore;
use url_metering::state::AppState;

/// CLI tool for the URL metering core.
#[derive(Parser)]
#[command(name = "url-metering")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Account acting as the caller
    #[arg(long, global = true)]
    caller: Option<Uuid>,

    /// Act with admin rights (checked against the stored account)
    #[arg(long, global = true)]
    admin: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level command groups.
#[derive(Subcommand)]
enum Commands {
    /// Database operations
    Db {
        #[command(subcommand)]
        action: DbAction,
    },

    /// Pricing plans
    Pricing {
        #[command(subcommand)]
        action: PricingAction,
    },

    /// Accounts and wallets
    Account {
        #[command(subcommand)]
        action: AccountAction,
    },

    /// Short URLs
    Url {
        #[command(subcommand)]
        action: UrlAction,
    },

    /// Ledger entries
    Ledger {
        #[command(subcommand)]
        action: LedgerAction,
    },
}

#[derive(Subcommand)]
enum DbAction {
    /// Check database connection
    Check,

    /// Apply embedded migrations
    Migrate,
}

#[derive(Args)]
struct PageArgs {
    /// Items per page
    #[arg(long, default_value_t = 20)]
    limit: i64,

    /// Zero-based page number
    #[arg(long, default_value_t = 0)]
    page: i64,
}

impl PageArgs {
    fn pagination(&self) -> Pagination {
        Pagination::new(self.limit, self.page)
    }
}

#[derive(Subcommand)]
enum PricingAction {
    /// Show the current plan
    Show,

    /// Publish a plan; the first one becomes the initial plan
    Publish {
        #[arg(long)]
        free_urls: i64,

        #[arg(long)]
        free_visits: i64,

        #[arg(long)]
        price_per_url: Decimal,

        #[arg(long)]
        price_per_visit: Decimal,

        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// List all plans, newest first
    History {
        #[command(flatten)]
        page: PageArgs,
    },
}

#[derive(Subcommand)]
enum AccountAction {
    /// Open an account with the current plan's free quota
    Open,

    /// Create an admin; without --caller only allowed while no admin exists
    CreateAdmin,

    /// List accounts (admin)
    List {
        /// Only active (true) or inactive (false) accounts
        #[arg(long)]
        active: Option<bool>,

        /// Only admins (true) or regular accounts (false)
        #[arg(long)]
        admins: Option<bool>,

        /// Include deleted accounts
        #[arg(long)]
        deleted: bool,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Re-enable an account (admin)
    Activate { account_id: Uuid },

    /// Block an account from spending and creating URLs (admin)
    Deactivate { account_id: Uuid },

    /// Delete an account and its URLs (admin)
    Delete {
        account_id: Uuid,

        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Show balance, quota, URLs and ledger
    Show { account_id: Uuid },

    /// Add money to the wallet
    Credit { account_id: Uuid, amount: Decimal },

    /// Take money from the wallet
    Debit { account_id: Uuid, amount: Decimal },

    /// Buy more URL quota
    RenewUrls { account_id: Uuid, count: i64 },
}

#[derive(Subcommand)]
enum UrlAction {
    /// Shorten a long URL
    Create { long_url: String },

    /// Resolve a short code, consuming one visit
    Redirect { code: String },

    /// Buy more visits for a URL
    Renew { url_id: Uuid, count: i64 },

    /// Delete a URL
    Delete {
        url_id: Uuid,

        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// List an account's URLs
    List {
        /// Owner (defaults to the caller)
        #[arg(long)]
        owner: Option<Uuid>,

        /// Case-insensitive search over long URL and code
        #[arg(long)]
        search: Option<String>,

        #[command(flatten)]
        page: PageArgs,
    },
}

#[derive(Subcommand)]
enum LedgerAction {
    /// List an account's ledger entries
    List {
        account_id: Uuid,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Monthly accounts, URLs and revenue for a year (admin)
    Report { year: i32 },

    /// Monthly renewal revenue for a year (admin)
    Revenue { year: i32 },
}

impl Cli {
    fn caller(&self) -> Result<Caller> {
        self.optional_caller()
            .context("--caller <ACCOUNT_ID> is required for this command")
    }

    fn optional_caller(&self) -> Option<Caller> {
        self.caller.map(|account_id| Caller {
            account_id,
            is_admin: self.admin,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = config::load_from_env()?;
    url_metering::logging::init(&config)?;
    config.print_summary();

    let pool = bootstrap::connect(&config).await?;
    let state = bootstrap::state(&config, pool)?;

    match &cli.command {
        Commands::Db { action } => handle_db_action(action, state.store.pool()).await?,
        Commands::Pricing { action } => handle_pricing_action(&cli, action, &state).await?,
        Commands::Account { action } => handle_account_action(&cli, action, &state).await?,
        Commands::Url { action } => handle_url_action(&cli, action, &state).await?,
        Commands::Ledger { action } => handle_ledger_action(&cli, action, &state).await?,
    }

    Ok(())
}

fn service_error(e: AppError) -> anyhow::Error {
    anyhow::anyhow!("{} [{}] {}", e, e.code(), e.details())
}

/// Handles database diagnostic commands.
async fn handle_db_action(action: &DbAction, pool: &sqlx::PgPool) -> Result<()> {
    match action {
        DbAction::Check => {
            println!("{}", "🔍 Checking database connection...".bright_blue());

            sqlx::query("SELECT 1").fetch_one(pool).await?;

            println!("{}", "✅ Database connection OK".green().bold());
        }
        DbAction::Migrate => {
            bootstrap::migrate(pool).await?;
            println!("{}", "✅ Migrations applied".green().bold());
        }
    }

    Ok(())
}

/// Dispatches pricing commands.
///
/// Publishing asks for confirmation (unless `--yes`) because a new plan
/// immediately reprices every later renewal.
async fn handle_pricing_action(
    cli: &Cli,
    action: &PricingAction,
    state: &AppState<PgStore>,
) -> Result<()> {
    match action {
        PricingAction::Show => {
            let plan = state.pricing.current_plan().await.map_err(service_error)?;
            print_plan(&plan);
        }
        PricingAction::Publish {
            free_urls,
            free_visits,
            price_per_url,
            price_per_visit,
            yes,
        } => {
            let caller = cli.caller()?;
            let new_plan = NewPricingPlan {
                free_url_quota: *free_urls,
                free_visits_per_url: *free_visits,
                price_per_url: *price_per_url,
                price_per_visit: *price_per_visit,
            };

            println!("{}", "💰 Publish Pricing Plan".bright_blue().bold());
            println!("  Free URLs:       {}", free_urls.to_string().cyan());
            println!("  Free visits/URL: {}", free_visits.to_string().cyan());
            println!("  Price per URL:   {}", format!("{price_per_url:.2}").cyan());
            println!("  Price per visit: {}", format!("{price_per_visit:.2}").cyan());
            println!();

            if !yes {
                let confirmed = Confirm::new()
                    .with_prompt("Publish this plan?")
                    .default(false)
                    .interact()?;

                if !confirmed {
                    println!("{}", "❌ Cancelled".red());
                    return Ok(());
                }
            }

            let plan = match state.pricing.current_plan().await {
                Err(AppError::NotFound { .. }) => {
                    state.pricing.set_initial_plan(&caller, new_plan).await
                }
                Err(e) => Err(e),
                Ok(_) => state.pricing.publish_plan(&caller, new_plan).await,
            }
            .map_err(service_error)?;

            println!("{}", "✅ Plan published".green().bold());
            print_plan(&plan);
        }
        PricingAction::History { page } => {
            let caller = cli.caller()?;
            let plans = state
                .pricing
                .history(&caller, page.pagination())
                .await
                .map_err(service_error)?;

            println!("{}", "📋 Pricing Plans".bright_blue().bold());
            println!();
            for plan in &plans.items {
                print_plan(plan);
            }
            print_total(&plans);
        }
    }

    Ok(())
}

/// Dispatches account and wallet commands.
async fn handle_account_action(
    cli: &Cli,
    action: &AccountAction,
    state: &AppState<PgStore>,
) -> Result<()> {
    let account = match action {
        AccountAction::Open => {
            let account = state.wallet.open_account().await.map_err(service_error)?;
            println!("{}", "✨ Account opened".green().bold());
            account
        }
        AccountAction::CreateAdmin => {
            let account = state
                .wallet
                .create_admin(cli.optional_caller().as_ref())
                .await
                .map_err(service_error)?;
            println!("{}", "🛡️  Admin created".green().bold());
            account
        }
        AccountAction::List {
            active,
            admins,
            deleted,
            page,
        } => {
            let filter = AccountFilter {
                active: *active,
                admin: *admins,
                include_deleted: *deleted,
            };
            let accounts = state
                .wallet
                .accounts(&cli.caller()?, filter, page.pagination())
                .await
                .map_err(service_error)?;

            println!("{}", "👥 Accounts".bright_blue().bold());
            if accounts.is_empty() {
                println!();
                println!("{}", "  No accounts found".yellow());
                return Ok(());
            }
            accounts.items.iter().for_each(print_account);
            print_total(&accounts);
            return Ok(());
        }
        AccountAction::Activate { account_id } => state
            .wallet
            .set_active(&cli.caller()?, *account_id, true)
            .await
            .map_err(service_error)?,
        AccountAction::Deactivate { account_id } => state
            .wallet
            .set_active(&cli.caller()?, *account_id, false)
            .await
            .map_err(service_error)?,
        AccountAction::Delete { account_id, yes } => {
            let caller = cli.caller()?;
            if !yes {
                let confirmed = Confirm::new()
                    .with_prompt(format!("Delete account {account_id} and all its URLs?"))
                    .default(false)
                    .interact()?;

                if !confirmed {
                    println!("{}", "❌ Cancelled".red());
                    return Ok(());
                }
            }

            state
                .wallet
                .delete_account(&caller, *account_id)
                .await
                .map_err(service_error)?;
            println!("{}", "🗑️  Account deleted".green().bold());
            return Ok(());
        }
        AccountAction::Show { account_id } => {
            let account = state
                .wallet
                .overview(&cli.caller()?, *account_id)
                .await
                .map_err(service_error)?;
            print_account(&account);

            if let Some(urls) = &account.short_urls {
                println!("{}", "  URLs:".bright_white().bold());
                urls.iter().for_each(print_url);
            }
            if let Some(entries) = &account.ledger_entries {
                println!("{}", "  Ledger:".bright_white().bold());
                entries.iter().for_each(print_entry);
            }
            return Ok(());
        }
        AccountAction::Credit { account_id, amount } => state
            .wallet
            .credit(&cli.caller()?, *account_id, *amount)
            .await
            .map_err(service_error)?,
        AccountAction::Debit { account_id, amount } => state
            .wallet
            .debit(&cli.caller()?, *account_id, *amount)
            .await
            .map_err(service_error)?,
        AccountAction::RenewUrls { account_id, count } => state
            .wallet
            .renew_url_quota(&cli.caller()?, *account_id, *count)
            .await
            .map_err(service_error)?,
    };

    print_account(&account);
    Ok(())
}

/// Dispatches short URL commands.
async fn handle_url_action(cli: &Cli, action: &UrlAction, state: &AppState<PgStore>) -> Result<()> {
    match action {
        UrlAction::Create { long_url } => {
            let url = state
                .urls
                .create(&cli.caller()?, long_url)
                .await
                .map_err(service_error)?;
            println!("{}", "✅ Short URL created".green().bold());
            print_url(&url);
        }
        UrlAction::Redirect { code } => {
            let long_url = state.urls.redirect(code).await.map_err(service_error)?;
            println!("{} {}", "➡️ ".bright_blue(), long_url.bright_white());
        }
        UrlAction::Renew { url_id, count } => {
            let url = state
                .urls
                .renew_visits(&cli.caller()?, *url_id, *count)
                .await
                .map_err(service_error)?;
            println!("{}", "✅ Visits renewed".green().bold());
            print_url(&url);
        }
        UrlAction::Delete { url_id, yes } => {
            let caller = cli.caller()?;
            if !yes {
                let confirmed = Confirm::new()
                    .with_prompt(format!("Delete URL {url_id}?"))
                    .default(false)
                    .interact()?;

                if !confirmed {
                    println!("{}", "❌ Cancelled".red());
                    return Ok(());
                }
            }

            state
                .urls
                .delete(&caller, *url_id)
                .await
                .map_err(service_error)?;
            println!("{}", "🗑️  URL deleted".green().bold());
        }
        UrlAction::List {
            owner,
            search,
            page,
        } => {
            let caller = cli.caller()?;
            let owner = owner.unwrap_or(caller.account_id);
            let urls = state
                .urls
                .list(&caller, owner, search.as_deref(), page.pagination())
                .await
                .map_err(service_error)?;

            println!("{}", "🔗 Short URLs".bright_blue().bold());
            println!();
            if urls.is_empty() {
                println!("{}", "  No URLs found".yellow());
                return Ok(());
            }
            urls.items.iter().for_each(print_url);
            print_total(&urls);
        }
    }

    Ok(())
}

async fn handle_ledger_action(
    cli: &Cli,
    action: &LedgerAction,
    state: &AppState<PgStore>,
) -> Result<()> {
    match action {
        LedgerAction::List { account_id, page } => {
            let entries = state
                .ledger
                .entries(&cli.caller()?, *account_id, page.pagination())
                .await
                .map_err(service_error)?;

            println!("{}", "📒 Ledger".bright_blue().bold());
            println!();
            if entries.is_empty() {
                println!("{}", "  No entries found".yellow());
                return Ok(());
            }
            entries.items.iter().for_each(print_entry);
            print_total(&entries);
        }
        LedgerAction::Report { year } => {
            let report = state
                .ledger
                .report(&cli.caller()?, *year)
                .await
                .map_err(service_error)?;

            println!("{}", format!("📊 Report {year}").bright_blue().bold());
            println!(
                "  {:<5} {:>8} {:>8} {:>8} {:>8} {:>14}",
                "month", "accounts", "active", "urls", "renewals", "revenue"
            );
            report.iter().for_each(print_month);
        }
        LedgerAction::Revenue { year } => {
            let revenue = state
                .ledger
                .monthly_revenue(&cli.caller()?, *year)
                .await
                .map_err(service_error)?;

            println!("{}", format!("💵 Revenue {year}").bright_blue().bold());
            for (month, amount) in revenue {
                println!("  {:<5} {}", month, format!("{amount:>14.2}").bright_green());
            }
        }
    }

    Ok(())
}

fn print_month(month: &MonthlyReport) {
    println!(
        "  {:<5} {:>8} {:>8} {:>8} {:>8} {}",
        month.month,
        month.new_accounts,
        month.active_accounts,
        month.urls_created,
        month.renewals,
        format!("{:>14.2}", month.revenue).bright_green(),
    );
}

fn print_plan(plan: &PricingPlan) {
    println!(
        "  {} {}  free urls: {}  free visits/url: {}  url: {}  visit: {}",
        plan.created_at.format("%Y-%m-%d %H:%M").to_string().bright_black(),
        plan.id.to_string().bright_black(),
        plan.free_url_quota.to_string().cyan(),
        plan.free_visits_per_url.to_string().cyan(),
        format!("{:.2}", plan.price_per_url).bright_yellow(),
        format!("{:.2}", plan.price_per_visit).bright_yellow(),
    );
}

fn print_account(account: &Account) {
    let status = if account.is_active {
        "ACTIVE".green()
    } else {
        "INACTIVE".red()
    };
    let role = if account.is_admin { "admin" } else { "user" };

    println!();
    println!("  ID:        {}", account.id.to_string().cyan());
    println!("  Role:      {}", role.bright_white());
    println!("  Status:    {}", status);
    println!(
        "  Balance:   {}",
        format!("{:.2}", account.wallet_balance).bright_green().bold()
    );
    println!(
        "  URL quota: {}",
        account.url_quota.to_string().bright_green().bold()
    );
    println!();
}

fn print_url(url: &ShortUrl) {
    println!(
        "  {:<7} {:<50} visits left: {:<6} visited: {}  {}",
        url.short_code.bright_yellow().bold(),
        url.long_url.cyan(),
        url.remaining_visits,
        url.visit_count,
        url.id.to_string().bright_black(),
    );
}

fn print_entry(entry: &LedgerEntry) {
    println!(
        "  {} {:<15} {:>12}  {}",
        entry.created_at.format("%Y-%m-%d %H:%M").to_string().bright_black(),
        entry.kind.as_str().bright_white(),
        format!("{:.2}", entry.amount).bright_green(),
        entry.note,
    );
}

fn print_total<T>(page: &Page<T>) {
    println!();
    println!(
        "  Total: {}",
        page.total
            .unwrap_or(page.len() as i64)
            .to_string()
            .bright_white()
            .bold()
    );
    println!();
}
