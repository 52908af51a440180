mod cli;

use clap::Parser;
use pocketledger::reports::TransactionFilter;

use cli::extract::ExtractOptions;
use cli::recurring::RuleFields;
use cli::tx::{ListPeriod, TxFields};
use cli::{
    AccountsCommands, BudgetsCommands, CategoriesCommands, Cli, Commands, RecurringCommands, ReportCommands,
    TxCommands,
};

fn main() {
    pocketledger::init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir),
        Commands::Accounts { command } => match command {
            AccountsCommands::Add { name, kind, opening } => cli::accounts::add(&name, kind, opening),
            AccountsCommands::List => cli::accounts::list(),
            AccountsCommands::Deactivate { id } => cli::accounts::set_active(id, false),
            AccountsCommands::Activate { id } => cli::accounts::set_active(id, true),
            AccountsCommands::Delete { id, yes } => cli::accounts::delete(id, yes),
        },
        Commands::Categories { command } => match command {
            CategoriesCommands::Add { name, kind, color } => cli::categories::add(&name, kind, &color),
            CategoriesCommands::List { kind } => cli::categories::list(kind),
            CategoriesCommands::Delete { id } => cli::categories::delete(id),
        },
        Commands::Tx { command } => match command {
            TxCommands::Add {
                account,
                amount,
                kind,
                to,
                category,
                date,
                note,
            } => cli::tx::add(
                account,
                amount,
                TxFields {
                    account: None,
                    amount: None,
                    kind,
                    to,
                    category,
                    date,
                    note: Some(note),
                },
            ),
            TxCommands::Edit {
                id,
                account,
                amount,
                kind,
                to,
                category,
                date,
                note,
            } => cli::tx::edit(
                id,
                TxFields {
                    account,
                    amount,
                    kind,
                    to,
                    category,
                    date,
                    note,
                },
            ),
            TxCommands::Delete { id } => cli::tx::delete(id),
            TxCommands::List {
                account,
                month,
                year,
                from_date,
                to_date,
                kind,
                category,
                search,
                min,
                max,
                sort,
            } => {
                let (m_year, m_month) = cli::split_month(month);
                let period = ListPeriod {
                    year: year.or(m_year),
                    month: m_month,
                    from_date,
                    to_date,
                };
                let filter = TransactionFilter {
                    search,
                    kind,
                    account_id: account,
                    category_id: category,
                    range: None,
                    min_amount: min,
                    max_amount: max,
                    sort,
                };
                cli::tx::list(period, filter)
            }
        },
        Commands::Recurring { command } => match command {
            RecurringCommands::Add {
                name,
                account,
                amount,
                kind,
                frequency,
                start,
                end,
                to,
                category,
                note,
            } => cli::recurring::add(
                &name,
                account,
                amount,
                RuleFields {
                    kind,
                    frequency,
                    start,
                    end,
                    to,
                    category,
                    note,
                },
            ),
            RecurringCommands::List => cli::recurring::list(),
            RecurringCommands::Pause { id } => cli::recurring::set_active(id, false),
            RecurringCommands::Resume { id } => cli::recurring::set_active(id, true),
            RecurringCommands::Delete { id } => cli::recurring::delete(id),
            RecurringCommands::Run { date } => cli::recurring::run(date),
        },
        Commands::Budgets { command } => match command {
            BudgetsCommands::Set {
                amount,
                category,
                period,
                start,
                alert,
            } => cli::budgets::set(amount, category, period, start, alert),
            BudgetsCommands::Status { date } => cli::budgets::status(date),
            BudgetsCommands::List => cli::budgets::list(),
            BudgetsCommands::Deactivate { id } => cli::budgets::deactivate(id),
            BudgetsCommands::Delete { id } => cli::budgets::delete(id),
        },
        Commands::Extract {
            sender,
            body,
            book,
            account,
            category,
            json,
        } => cli::extract::run(
            &sender,
            body,
            ExtractOptions {
                book,
                account,
                category,
                json,
            },
        ),
        Commands::Reconcile {
            account,
            balance,
            apply,
            history,
        } => {
            if history {
                cli::reconcile::history(account)
            } else {
                cli::reconcile::run(account, balance, apply)
            }
        }
        Commands::Report { command } => match command {
            ReportCommands::Summary {
                month,
                year,
                from_date,
                to_date,
            } => cli::report::summary(month, year, from_date, to_date),
            ReportCommands::Categories { kind, month, year } => cli::report::categories(kind, month, year),
            ReportCommands::Cashflow { year } => cli::report::cashflow(year),
            ReportCommands::Balances => cli::report::balances(),
        },
        Commands::Status => cli::status::run(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
