// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use clap::{Arg, ArgAction, Command, value_parser};

fn req(id: &'static str, help: &'static str) -> Arg {
    Arg::new(id).long(id).required(true).help(help)
}

fn opt(id: &'static str, help: &'static str) -> Arg {
    Arg::new(id).long(id).help(help)
}

fn json_flags(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("json")
            .long("json")
            .action(ArgAction::SetTrue)
            .help("Print JSON"),
    )
    .arg(
        Arg::new("jsonl")
            .long("jsonl")
            .action(ArgAction::SetTrue)
            .conflicts_with("json")
            .help("Print one JSON object per line"),
    )
}

fn json_flag(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("json")
            .long("json")
            .action(ArgAction::SetTrue)
            .help("Print JSON"),
    )
}

fn active_cmd(name: &'static str, about: &'static str, code_help: &'static str) -> Command {
    Command::new(name)
        .about(about)
        .arg(req("code", code_help))
        .arg(
            Arg::new("off")
                .long("off")
                .action(ArgAction::SetTrue)
                .help("Deactivate instead of reactivating"),
        )
}

fn structure_cmd() -> Command {
    Command::new("structure")
        .about("Fee structure templates")
        .subcommand(
            Command::new("add")
                .about("Add a fee template for a class or program")
                .arg(opt("class", "Class id"))
                .arg(opt("program", "Program id"))
                .arg(req("type", "Fee type (tuition, library, ...)"))
                .arg(req("amount", "Amount, or rate per credit"))
                .arg(
                    Arg::new("per_credit")
                        .long("per-credit")
                        .action(ArgAction::SetTrue)
                        .help("Charge amount per enrolled credit"),
                )
                .arg(opt("period", "Academic period id"))
                .arg(req("due", "Due date YYYY-MM-DD"))
                .arg(req("description", "Description")),
        )
        .subcommand(json_flags(Command::new("list").about("List fee templates")))
        .subcommand(
            Command::new("assign")
                .about("Bill a student from a template")
                .arg(req("structure", "Fee structure id"))
                .arg(req("student", "Student id"))
                .arg(
                    Arg::new("credits")
                        .long("credits")
                        .value_parser(value_parser!(u32))
                        .help("Credits for per-credit templates"),
                ),
        )
}

fn fee_cmd() -> Command {
    Command::new("fee")
        .about("Student fee invoices")
        .subcommand(
            Command::new("add")
                .about("Create an ad hoc fee")
                .arg(req("student", "Student id"))
                .arg(req("amount", "Amount"))
                .arg(req("due", "Due date YYYY-MM-DD"))
                .arg(req("description", "Description"))
                .arg(opt("type", "Fee type (default other)"))
                .arg(opt("notes", "Free-form notes")),
        )
        .subcommand(json_flags(
            Command::new("list")
                .about("List fees")
                .arg(opt("student", "Filter by student id"))
                .arg(opt("status", "Filter by status"))
                .arg(
                    Arg::new("limit")
                        .long("limit")
                        .value_parser(value_parser!(usize))
                        .help("Maximum rows"),
                ),
        ))
        .subcommand(
            Command::new("show")
                .about("Show one fee with allocations and overrides")
                .arg(req("id", "Fee id")),
        )
        .subcommand(
            Command::new("status")
                .about("Administratively mark a fee paid")
                .arg(req("id", "Fee id"))
                .arg(req("status", "Target status (paid)")),
        )
        .subcommand(
            Command::new("bulk")
                .about("Mark paid or delete many fees at once")
                .arg(req("action", "paid|delete"))
                .arg(req("ids", "Comma separated fee ids")),
        )
        .subcommand(json_flag(
            Command::new("penalties").about("Apply late fees to overdue invoices"),
        ))
        .subcommand(json_flag(
            Command::new("statement")
                .about("Account statement for one student")
                .arg(req("student", "Student id")),
        ))
}

fn payment_cmd() -> Command {
    Command::new("payment")
        .about("Payments received")
        .subcommand(
            Command::new("add")
                .about("Record a payment")
                .arg(req("student", "Student id"))
                .arg(req("amount", "Amount"))
                .arg(req("date", "Payment date YYYY-MM-DD"))
                .arg(req("method", "cash|card|bank_transfer|cheque|online"))
                .arg(req("number", "Receipt / payment number"))
                .arg(
                    Arg::new("pending")
                        .long("pending")
                        .action(ArgAction::SetTrue)
                        .help("Record as pending until the funds clear"),
                ),
        )
        .subcommand(json_flags(
            Command::new("list")
                .about("List payments")
                .arg(opt("student", "Filter by student id")),
        ))
        .subcommand(
            Command::new("status")
                .about("Change payment status")
                .arg(req("id", "Payment id"))
                .arg(req("status", "completed|failed|refunded")),
        )
        .subcommand(json_flag(
            Command::new("balance")
                .about("Allocated and unallocated amounts of a payment")
                .arg(req("id", "Payment id")),
        ))
}

fn allocate_cmd() -> Command {
    Command::new("allocate")
        .about("Apply payments to fees")
        .subcommand(
            Command::new("add")
                .about("Allocate part of a payment to a fee")
                .arg(req("payment", "Payment id"))
                .arg(req("fee", "Fee id"))
                .arg(req("amount", "Amount")),
        )
        .subcommand(json_flags(
            Command::new("list")
                .about("List allocations of a payment or a fee")
                .arg(opt("payment", "Payment id"))
                .arg(opt("fee", "Fee id")),
        ))
}

fn plan_cmd() -> Command {
    Command::new("plan")
        .about("Installment payment plans")
        .subcommand(
            Command::new("create")
                .about("Create a plan and its installment schedule")
                .arg(req("student", "Student id"))
                .arg(req("total", "Total amount"))
                .arg(req("start", "First due date YYYY-MM-DD"))
                .arg(req("frequency", "monthly|quarterly"))
                .arg(
                    Arg::new("count")
                        .long("count")
                        .required(true)
                        .value_parser(value_parser!(u32))
                        .help("Number of installments (1-12)"),
                ),
        )
        .subcommand(json_flag(
            Command::new("show").about("Show a plan").arg(req("id", "Plan id")),
        ))
        .subcommand(
            Command::new("pay")
                .about("Mark one installment paid")
                .arg(req("id", "Plan id"))
                .arg(
                    Arg::new("installment")
                        .long("installment")
                        .required(true)
                        .value_parser(value_parser!(u32))
                        .help("Installment number, starting at 1"),
                ),
        )
        .subcommand(
            Command::new("cancel")
                .about("Cancel an active plan")
                .arg(req("id", "Plan id")),
        )
}

fn scholarship_cmd() -> Command {
    Command::new("scholarship")
        .about("Scholarship catalog and awards")
        .subcommand(
            Command::new("type-add")
                .about("Add a scholarship type")
                .arg(req("name", "Name"))
                .arg(req("code", "Unique code"))
                .arg(
                    Arg::new("amount_type")
                        .long("amount-type")
                        .required(true)
                        .help("fixed|percentage"),
                )
                .arg(opt("amount", "Fixed amount"))
                .arg(opt("percent", "Percentage, e.g. 25 or 12.5")),
        )
        .subcommand(json_flags(Command::new("types").about("List scholarship types")))
        .subcommand(
            Command::new("award")
                .about("Award a scholarship to a student")
                .arg(req("code", "Scholarship type code"))
                .arg(req("student", "Student id"))
                .arg(opt("amount", "Awarded amount (overrides pre-fill)"))
                .arg(opt("reference", "Base amount for percentage pre-fill"))
                .arg(opt("disbursement", "fee_credit|direct_payment|stipend")),
        )
        .subcommand(json_flags(
            Command::new("awards")
                .about("List a student's awards")
                .arg(req("student", "Student id")),
        ))
        .subcommand(
            Command::new("award-status")
                .about("Suspend, reactivate or revoke an award")
                .arg(req("id", "Award id"))
                .arg(req("status", "active|suspended|revoked")),
        )
}

fn donor_cmd() -> Command {
    Command::new("donor")
        .about("Donors and donations")
        .subcommand(
            Command::new("add")
                .about("Add a donor")
                .arg(req("code", "Donor code"))
                .arg(req("name", "Name"))
                .arg(req("type", "individual|alumni|corporate|foundation|government|other")),
        )
        .subcommand(json_flags(Command::new("list").about("List donors")))
        .subcommand(active_cmd("active", "Retire or restore a donor", "Donor code"))
        .subcommand(
            Command::new("give")
                .about("Record a donation")
                .arg(req("donor", "Donor code"))
                .arg(req("amount", "Amount"))
                .arg(opt("date", "Donation date (default today)"))
                .arg(req("purpose", "Purpose"))
                .arg(req("method", "Payment method")),
        )
        .subcommand(json_flags(
            Command::new("donations")
                .about("List donations")
                .arg(opt("donor", "Filter by donor code")),
        ))
        .subcommand(
            Command::new("post")
                .about("Post a donation to the general ledger")
                .arg(req("id", "Donation id")),
        )
}

fn endowment_cmd() -> Command {
    Command::new("endowment")
        .about("Endowment funds and investments")
        .subcommand(
            Command::new("add")
                .about("Create an endowment fund")
                .arg(req("code", "Fund code"))
                .arg(req("name", "Fund name"))
                .arg(req("principal", "Principal"))
                .arg(req("rate", "Spending rate percentage, e.g. 4.5")),
        )
        .subcommand(json_flags(Command::new("list").about("List funds with values")))
        .subcommand(active_cmd("active", "Close or reopen a fund", "Fund code"))
        .subcommand(
            Command::new("invest")
                .about("Add an investment holding to a fund")
                .arg(req("fund", "Fund code"))
                .arg(req("name", "Holding name"))
                .arg(req("quantity", "Units held"))
                .arg(req("cost", "Total cost basis"))
                .arg(req("price", "Current price per unit")),
        )
        .subcommand(
            Command::new("price")
                .about("Update the price of a holding")
                .arg(req("id", "Investment id"))
                .arg(req("price", "New price per unit")),
        )
        .subcommand(json_flag(
            Command::new("summary")
                .about("Value, gain and spendable amount of a fund")
                .arg(req("fund", "Fund code")),
        ))
}

fn gl_cmd() -> Command {
    Command::new("gl")
        .about("General ledger")
        .subcommand(
            Command::new("account-add")
                .about("Add a chart-of-accounts entry")
                .arg(req("code", "Account code"))
                .arg(req("name", "Account name"))
                .arg(req("type", "asset|liability|equity|revenue|expense"))
                .arg(opt("normal", "debit|credit (derived from type by default)"))
                .arg(
                    Arg::new("contra")
                        .long("contra")
                        .action(ArgAction::SetTrue)
                        .help("Allow a normal balance opposite to the type"),
                ),
        )
        .subcommand(json_flags(Command::new("accounts").about("List accounts")))
        .subcommand(active_cmd("account-active", "Deactivate or reactivate an account", "Account code"))
        .subcommand(
            Command::new("post")
                .about("Post a balanced journal entry")
                .arg(req("memo", "Memo"))
                .arg(opt("date", "Entry date (default today)"))
                .arg(opt("source", "Source reference"))
                .arg(
                    Arg::new("line")
                        .long("line")
                        .required(true)
                        .action(ArgAction::Append)
                        .help("CODE:DEBIT:CREDIT, repeatable"),
                ),
        )
        .subcommand(json_flag(
            Command::new("show")
                .about("Show one journal entry")
                .arg(req("id", "Journal entry id")),
        ))
        .subcommand(json_flags(Command::new("journal").about("List journal entries")))
        .subcommand(json_flag(
            Command::new("trial-balance").about("Per-account debit and credit totals"),
        ))
}

fn export_cmd() -> Command {
    let target = |name: &'static str, about: &'static str| {
        Command::new(name)
            .about(about)
            .arg(
                Arg::new("format")
                    .long("format")
                    .default_value("csv")
                    .help("csv|json"),
            )
            .arg(req("out", "Output file"))
    };
    Command::new("export")
        .about("Export ledger data")
        .subcommand(target("fees", "Export student fees"))
        .subcommand(target("journal", "Export journal lines"))
}

pub fn build_cli() -> Command {
    Command::new("bursar")
        .about("School finance ledger: fees, payments, plans, scholarships, donors and GL")
        .version(clap::crate_version!())
        .arg(
            Arg::new("operator")
                .long("operator")
                .global(true)
                .default_value("clerk")
                .help("Name recorded on audited changes"),
        )
        .arg(
            Arg::new("elevated")
                .long("elevated")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Act with bursar privileges (overrides, bulk actions)"),
        )
        .arg(
            Arg::new("as_of")
                .long("as-of")
                .global(true)
                .help("Business date YYYY-MM-DD (default today)"),
        )
        .subcommand(Command::new("init").about("Create the database"))
        .subcommand(structure_cmd())
        .subcommand(fee_cmd())
        .subcommand(payment_cmd())
        .subcommand(allocate_cmd())
        .subcommand(plan_cmd())
        .subcommand(scholarship_cmd())
        .subcommand(donor_cmd())
        .subcommand(endowment_cmd())
        .subcommand(gl_cmd())
        .subcommand(
            Command::new("exec")
                .about("Run one JSON request")
                .arg(req("file", "Request file, or - for stdin")),
        )
        .subcommand(export_cmd())
        .subcommand(json_flag(
            Command::new("doctor").about("Scan the ledger for inconsistencies"),
        ))
        .subcommand(
            Command::new("config")
                .about("Finance settings")
                .subcommand(json_flag(Command::new("show").about("Show effective settings")))
                .subcommand(Command::new("get").about("Read a raw setting").arg(req("key", "Key")))
                .subcommand(
                    Command::new("set")
                        .about("Change a setting")
                        .arg(req("key", "Key"))
                        .arg(req("value", "Value")),
                ),
        )
}
