use anyhow::{anyhow, Context, Result};
use chrono::{Datelike, Duration as ChronoDuration, Local, NaiveDate};
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{error, info};

use rangeops::bootstrap::AppContext;
use rangeops::config;
use rangeops::contact::ContactForm;
use rangeops::db;
use rangeops::finance;
use rangeops::model::{
    AmendedDocument, ClientStatus, CostFrequency, DepositStatus, EmploymentType, NewClient,
    NewCostStructure, NewOperator, NewQuote, NewSession, QuoteStatus, RateKind, SessionStatus,
};
use rangeops::planning::SessionFilter;

#[derive(Debug, Parser)]
#[command(author, version, about = "Operations backend: planning, staffing, quotes and costs")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write an example config file and exit
    InitConfig,
    #[command(subcommand)]
    Clients(ClientCmd),
    #[command(subcommand)]
    Operators(OperatorCmd),
    #[command(subcommand)]
    Sessions(SessionCmd),
    #[command(subcommand)]
    Staffing(StaffingCmd),
    /// Sessions an operator can still apply to
    Marketplace {
        operator: i64,
        #[arg(long)]
        today: Option<NaiveDate>,
    },
    #[command(subcommand)]
    Quotes(QuoteCmd),
    #[command(subcommand)]
    Invoices(InvoiceCmd),
    #[command(subcommand)]
    Costs(CostCmd),
    /// Submit a contact form to the configured relay
    Contact {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        message: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        company: Option<String>,
    },
    /// Keep polling the planning board until Ctrl-C
    Watch {
        #[arg(long)]
        region: Option<String>,
        /// Days ahead of today to include
        #[arg(long, default_value = "14")]
        days: i64,
    },
}

#[derive(Debug, Subcommand)]
enum ClientCmd {
    Add {
        #[arg(long)]
        first: String,
        #[arg(long)]
        last: String,
        #[arg(long)]
        company: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        /// Structure type tag, e.g. police, private, security
        #[arg(long)]
        structure: Option<String>,
        #[arg(long)]
        status: Option<ClientStatus>,
    },
    List {
        #[arg(long)]
        status: Option<ClientStatus>,
    },
    Status { id: i64, status: ClientStatus },
    Delete { id: i64 },
}

#[derive(Debug, Subcommand)]
enum OperatorCmd {
    Add {
        #[arg(long)]
        first: String,
        #[arg(long)]
        last: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long, default_value = "freelance")]
        employment: EmploymentType,
    },
    List {
        /// Include inactive operators
        #[arg(long)]
        all: bool,
    },
    /// Add a rate record
    Rate {
        operator: i64,
        #[arg(long)]
        kind: RateKind,
        #[arg(long)]
        amount_cents: i64,
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    Rates { operator: i64 },
    Deactivate { operator: i64 },
}

#[derive(Debug, ClapArgs)]
struct FilterArgs {
    #[arg(long)]
    from: Option<NaiveDate>,
    #[arg(long)]
    to: Option<NaiveDate>,
    #[arg(long)]
    region: Option<String>,
    #[arg(long)]
    status: Option<SessionStatus>,
    #[arg(long)]
    client: Option<i64>,
}

impl From<FilterArgs> for SessionFilter {
    fn from(a: FilterArgs) -> Self {
        SessionFilter {
            from: a.from,
            to: a.to,
            region: a.region,
            status: a.status,
            client_id: a.client,
        }
    }
}

#[derive(Debug, Subcommand)]
enum SessionCmd {
    Create {
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        region: String,
        #[arg(long)]
        client: Option<i64>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        #[arg(long, default_value = "1")]
        min_operators: i64,
        #[arg(long)]
        marketplace: bool,
        #[arg(long, default_value = "pending_confirmation")]
        status: SessionStatus,
    },
    List(FilterArgs),
    Status { id: i64, status: SessionStatus },
    /// Show or hide a session on the operator marketplace
    Marketplace {
        id: i64,
        #[arg(long)]
        hide: bool,
    },
    Delete { id: i64 },
    /// Operator cost of the accepted staff
    Cost { id: i64 },
}

#[derive(Debug, Subcommand)]
enum StaffingCmd {
    Apply { session: i64, operator: i64 },
    Propose { session: i64, operator: i64 },
    Accept { session: i64, operator: i64 },
    Reject { session: i64, operator: i64 },
    Withdraw { session: i64, operator: i64 },
    Pending { session: i64 },
}

#[derive(Debug, Subcommand)]
enum QuoteCmd {
    Create {
        #[arg(long)]
        client: i64,
        #[arg(long)]
        subtotal_cents: i64,
        /// Percent; defaults to finance.default_tax_rate
        #[arg(long)]
        tax_rate: Option<f64>,
        #[arg(long)]
        session: Option<i64>,
        #[arg(long, default_value = "30")]
        valid_days: i64,
    },
    List {
        #[arg(long)]
        client: Option<i64>,
    },
    Status { id: i64, status: QuoteStatus },
    Amend {
        quote: i64,
        #[arg(long, allow_hyphen_values = true)]
        delta_cents: i64,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        sign: bool,
    },
}

#[derive(Debug, Subcommand)]
enum InvoiceCmd {
    /// Invoice an accepted quote
    Create {
        quote: i64,
        #[arg(long, default_value = "30")]
        due_days: i64,
    },
    List {
        #[arg(long)]
        client: Option<i64>,
    },
    Amend {
        invoice: i64,
        #[arg(long, allow_hyphen_values = true)]
        delta_cents: i64,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        sign: bool,
    },
    Deposit {
        invoice: i64,
        #[arg(long)]
        amount_cents: i64,
        /// Mark as received today
        #[arg(long)]
        received: bool,
    },
    Balance { invoice: i64 },
}

#[derive(Debug, Subcommand)]
enum CostCmd {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        category: String,
        #[arg(long, default_value = "monthly")]
        frequency: CostFrequency,
        #[arg(long)]
        amount_cents: i64,
    },
    List {
        #[arg(long)]
        category: Option<String>,
    },
    /// Revenue, costs and margin for one month (YYYY-MM)
    Summary {
        #[arg(long)]
        month: Option<String>,
    },
}

#[derive(Debug, Serialize)]
struct MonthSummary {
    month: String,
    revenue_cents: i64,
    monthly_costs_cents: i64,
    margin_percent: Option<f64>,
    margin_target_percent: f64,
    meets_target: bool,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// First and last day of `YYYY-MM`, or of the current month.
fn month_bounds(month: Option<&str>) -> Result<(NaiveDate, NaiveDate)> {
    let first = match month {
        Some(m) => NaiveDate::parse_from_str(&format!("{}-01", m.trim()), "%Y-%m-%d")
            .with_context(|| format!("invalid month '{}', expected YYYY-MM", m))?,
        None => today().with_day(1).ok_or_else(|| anyhow!("invalid date"))?,
    };
    let next = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    }
    .ok_or_else(|| anyhow!("month out of range"))?;
    Ok((first, next - ChronoDuration::days(1)))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if let Command::InitConfig = args.command {
        if args.config.exists() {
            return Err(anyhow!("{} already exists", args.config.display()));
        }
        std::fs::write(&args.config, config::example())?;
        info!(path = %args.config.display(), "wrote example config");
        return Ok(());
    }

    let cfg = config::load(Some(&args.config))?;
    let ctx = AppContext::init(cfg).await?;
    run(&ctx, args.command).await
}

async fn run(ctx: &AppContext, command: Command) -> Result<()> {
    let pool = &ctx.pool;
    match command {
        Command::InitConfig => Ok(()),
        Command::Clients(cmd) => match cmd {
            ClientCmd::Add {
                first,
                last,
                company,
                email,
                phone,
                structure,
                status,
            } => {
                let client = db::create_client(
                    pool,
                    &NewClient {
                        first_name: first,
                        last_name: last,
                        company,
                        email,
                        phone,
                        structure_type: structure,
                        status,
                        notes: None,
                    },
                )
                .await?;
                print_json(&client)
            }
            ClientCmd::List { status } => print_json(&db::list_clients(pool, status).await?),
            ClientCmd::Status { id, status } => {
                print_json(&db::update_client_status(pool, id, status).await?)
            }
            ClientCmd::Delete { id } => print_json(&db::delete_client(pool, id).await?),
        },
        Command::Operators(cmd) => match cmd {
            OperatorCmd::Add {
                first,
                last,
                email,
                phone,
                employment,
            } => {
                let operator = db::create_operator(
                    pool,
                    &NewOperator {
                        first_name: first,
                        last_name: last,
                        email,
                        phone,
                        employment_type: employment,
                    },
                )
                .await?;
                print_json(&operator)
            }
            OperatorCmd::List { all } => print_json(&db::list_operators(pool, !all).await?),
            OperatorCmd::Rate {
                operator,
                kind,
                amount_cents,
                from,
                to,
            } => print_json(&db::add_rate(pool, operator, kind, amount_cents, from, to).await?),
            OperatorCmd::Rates { operator } => print_json(&db::list_rates(pool, operator).await?),
            OperatorCmd::Deactivate { operator } => {
                print_json(&db::set_operator_active(pool, operator, false).await?)
            }
        },
        Command::Sessions(cmd) => match cmd {
            SessionCmd::Create {
                date,
                region,
                client,
                title,
                start,
                end,
                min_operators,
                marketplace,
                status,
            } => {
                let session = db::create_session(
                    pool,
                    &NewSession {
                        date,
                        start_time: start,
                        end_time: end,
                        region,
                        client_id: client,
                        title,
                        status,
                        min_operators,
                        marketplace_visible: marketplace,
                        notes: None,
                    },
                )
                .await?;
                print_json(&session)
            }
            SessionCmd::List(filter) => {
                print_json(&ctx.planning.fetch_sessions(&filter.into()).await)
            }
            SessionCmd::Status { id, status } => {
                print_json(&db::update_session_status(pool, id, status).await?)
            }
            SessionCmd::Marketplace { id, hide } => {
                print_json(&db::set_marketplace_visible(pool, id, !hide).await?)
            }
            SessionCmd::Delete { id } => print_json(&db::delete_session(pool, id).await?),
            SessionCmd::Cost { id } => print_json(&db::staffing_cost(pool, id).await?),
        },
        Command::Staffing(cmd) => {
            let (session, outcome) = match cmd {
                StaffingCmd::Apply { session, operator } => {
                    (session, ctx.staffing.apply(session, operator).await)
                }
                StaffingCmd::Propose { session, operator } => {
                    (session, ctx.staffing.propose(session, operator).await)
                }
                StaffingCmd::Accept { session, operator } => {
                    (session, ctx.staffing.accept(session, operator).await)
                }
                StaffingCmd::Reject { session, operator } => {
                    (session, ctx.staffing.reject(session, operator).await)
                }
                StaffingCmd::Withdraw { session, operator } => {
                    (session, ctx.staffing.withdraw(session, operator).await)
                }
                StaffingCmd::Pending { session } => {
                    return print_json(&ctx.staffing.pending_for(session).await?);
                }
            };
            // Re-read after the write so the counters shown are the store's.
            let refreshed = db::get_session(pool, session).await?;
            print_json(&serde_json::json!({ "outcome": outcome, "session": refreshed }))
        }
        Command::Marketplace { operator, today: on } => {
            let on = on.unwrap_or_else(today);
            print_json(&ctx.planning.marketplace_for(operator, on).await)
        }
        Command::Quotes(cmd) => match cmd {
            QuoteCmd::Create {
                client,
                subtotal_cents,
                tax_rate,
                session,
                valid_days,
            } => {
                let issued_on = today();
                let quote = db::create_quote(
                    pool,
                    &NewQuote {
                        client_id: client,
                        session_id: session,
                        subtotal_cents,
                        tax_rate: tax_rate.unwrap_or(ctx.config.finance.default_tax_rate),
                        issued_on,
                        valid_until: Some(issued_on + ChronoDuration::days(valid_days)),
                    },
                )
                .await?;
                print_json(&quote)
            }
            QuoteCmd::List { client } => print_json(&db::list_quotes(pool, client).await?),
            QuoteCmd::Status { id, status } => {
                print_json(&db::update_quote_status(pool, id, status).await?)
            }
            QuoteCmd::Amend {
                quote,
                delta_cents,
                reason,
                sign,
            } => {
                let document = AmendedDocument::Quote(quote);
                let amendment = db::add_amendment(pool, document, delta_cents, &reason).await?;
                if sign {
                    db::sign_amendment(pool, amendment.id).await?;
                }
                print_json(&db::list_amendments(pool, document).await?)
            }
        },
        Command::Invoices(cmd) => match cmd {
            InvoiceCmd::Create { quote, due_days } => {
                let issued_on = today();
                let invoice = db::invoice_from_quote(
                    pool,
                    quote,
                    issued_on,
                    Some(issued_on + ChronoDuration::days(due_days)),
                )
                .await?;
                print_json(&invoice)
            }
            InvoiceCmd::List { client } => print_json(&db::list_invoices(pool, client).await?),
            InvoiceCmd::Amend {
                invoice,
                delta_cents,
                reason,
                sign,
            } => {
                let amendment =
                    db::add_amendment(pool, AmendedDocument::Invoice(invoice), delta_cents, &reason)
                        .await?;
                if sign {
                    db::sign_amendment(pool, amendment.id).await?;
                }
                print_json(&db::invoice_balance(pool, invoice).await?)
            }
            InvoiceCmd::Deposit {
                invoice,
                amount_cents,
                received,
            } => {
                let deposit = db::add_deposit(pool, invoice, amount_cents).await?;
                if received {
                    db::update_deposit_status(pool, deposit.id, DepositStatus::Received, Some(today()))
                        .await?;
                }
                print_json(&db::invoice_balance(pool, invoice).await?)
            }
            InvoiceCmd::Balance { invoice } => print_json(&db::invoice_balance(pool, invoice).await?),
        },
        Command::Costs(cmd) => match cmd {
            CostCmd::Add {
                name,
                category,
                frequency,
                amount_cents,
            } => {
                let cost = db::create_cost(
                    pool,
                    &NewCostStructure {
                        name,
                        category,
                        frequency,
                        amount_cents,
                    },
                )
                .await?;
                print_json(&cost)
            }
            CostCmd::List { category } => {
                print_json(&db::list_costs(pool, category.as_deref()).await?)
            }
            CostCmd::Summary { month } => {
                let (first, last) = month_bounds(month.as_deref())?;
                let revenue = db::paid_revenue(pool, first, last).await?;
                let costs = finance::monthly_cost_total(&db::list_costs(pool, None).await?);
                let target = ctx.config.finance.margin_target_percent;
                print_json(&MonthSummary {
                    month: first.format("%Y-%m").to_string(),
                    revenue_cents: revenue,
                    monthly_costs_cents: costs,
                    margin_percent: finance::margin_percent(revenue, costs),
                    margin_target_percent: target,
                    meets_target: finance::meets_margin_target(revenue, costs, target),
                })
            }
        },
        Command::Contact {
            name,
            email,
            message,
            phone,
            company,
        } => {
            let client = ctx
                .contact
                .as_ref()
                .ok_or_else(|| anyhow!("no contact endpoint configured"))?;
            let receipt = client
                .submit(&ContactForm {
                    name,
                    email,
                    phone,
                    company,
                    message,
                })
                .await?;
            print_json(&receipt)
        }
        Command::Watch { region, days } => watch(ctx, region, days).await,
    }
}

async fn watch(ctx: &AppContext, region: Option<String>, days: i64) -> Result<()> {
    let _services = ctx.spawn_optional_services();
    let interval = ctx.config.app.poll_interval();
    info!(?interval, "watching planning board");

    loop {
        let from = today();
        let filter = SessionFilter {
            from: Some(from),
            to: Some(from + ChronoDuration::days(days)),
            region: region.clone(),
            ..Default::default()
        };
        let response = ctx.planning.fetch_sessions(&filter).await;
        if response.success {
            let understaffed = response.data.iter().filter(|s| !s.fully_staffed).count();
            let pending: i64 = response.data.iter().map(|s| s.pending_operators).sum();
            info!(
                sessions = response.data.len(),
                understaffed,
                pending_applications = pending,
                "planning refreshed"
            );
        } else {
            error!(message = ?response.message, "planning refresh failed");
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("stopping watch");
                break;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_bounds_cover_whole_month() {
        let (first, last) = month_bounds(Some("2026-02")).unwrap();
        assert_eq!(first, NaiveDate::from_ymd_opt(2026, 2, 1).unwrap());
        assert_eq!(last, NaiveDate::from_ymd_opt(2026, 2, 28).unwrap());

        let (_, last) = month_bounds(Some("2026-12")).unwrap();
        assert_eq!(last, NaiveDate::from_ymd_opt(2026, 12, 31).unwrap());

        assert!(month_bounds(Some("2026-13")).is_err());
    }

    #[test]
    fn cli_parses_staffing_and_filters() {
        let args = Args::try_parse_from([
            "rangeops", "sessions", "list", "--from", "2026-03-01", "--status", "scheduled",
        ])
        .unwrap();
        match args.command {
            Command::Sessions(SessionCmd::List(filter)) => {
                let filter: SessionFilter = filter.into();
                assert_eq!(filter.status, Some(SessionStatus::Confirmed));
                assert_eq!(filter.from, NaiveDate::from_ymd_opt(2026, 3, 1));
            }
            other => panic!("unexpected command {other:?}"),
        }

        let args = Args::try_parse_from(["rangeops", "staffing", "accept", "3", "7"]).unwrap();
        assert!(matches!(
            args.command,
            Command::Staffing(StaffingCmd::Accept { session: 3, operator: 7 })
        ));
    }
}
