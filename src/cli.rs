// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use clap::{value_parser, Arg, ArgAction, Command};

fn json_flags(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("json")
            .long("json")
            .action(ArgAction::SetTrue)
            .help("Print output as pretty JSON"),
    )
    .arg(
        Arg::new("jsonl")
            .long("jsonl")
            .action(ArgAction::SetTrue)
            .help("Print output as JSON lines"),
    )
}

fn date_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name).long(name).value_name("YYYY-MM-DD").help(help)
}

pub fn build_cli() -> Command {
    Command::new("ledgerflow")
        .about("Personal cash-flow tracking, forecasting, recurring-charge automation, and alerts")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("owner")
                .long("owner")
                .global(true)
                .default_value("default")
                .help("Owner context all entities are scoped to"),
        )
        .subcommand(Command::new("init").about("Initialize the database"))
        .subcommand(
            Command::new("balance")
                .about("Opening balance management")
                .subcommand(
                    Command::new("set")
                        .about("Set the current opening balance")
                        .arg(Arg::new("amount").required(true))
                        .arg(Arg::new("currency").long("currency"))
                        .arg(date_arg("date", "Balance as-of date (default today)"))
                        .arg(Arg::new("note").long("note")),
                )
                .subcommand(json_flags(Command::new("show").about("Show the current balance")))
                .subcommand(json_flags(Command::new("history").about("Show balance history"))),
        )
        .subcommand(
            Command::new("tx")
                .about("Ledger entries")
                .subcommand(
                    Command::new("add")
                        .about("Record a ledger entry")
                        .arg(date_arg("date", "Entry date (default today)"))
                        .arg(Arg::new("amount").required(true))
                        .arg(
                            Arg::new("direction")
                                .long("direction")
                                .default_value("expense")
                                .help("income or expense"),
                        )
                        .arg(Arg::new("currency").long("currency").help("Original currency"))
                        .arg(Arg::new("category").long("category"))
                        .arg(Arg::new("note").long("note")),
                )
                .subcommand(json_flags(
                    Command::new("list")
                        .about("List ledger entries")
                        .arg(Arg::new("month").long("month").value_name("YYYY-MM"))
                        .arg(
                            Arg::new("limit")
                                .long("limit")
                                .value_parser(value_parser!(usize)),
                        ),
                ))
                .subcommand(
                    Command::new("delete")
                        .about("Delete a ledger entry")
                        .arg(Arg::new("id").required(true).value_parser(value_parser!(i64))),
                ),
        )
        .subcommand(
            Command::new("fixed")
                .about("Fixed recurring entries")
                .subcommand(
                    Command::new("add")
                        .arg(Arg::new("name").required(true))
                        .arg(Arg::new("amount").long("amount").required(true))
                        .arg(
                            Arg::new("direction")
                                .long("direction")
                                .default_value("expense"),
                        )
                        .arg(
                            Arg::new("day")
                                .long("day")
                                .required(true)
                                .value_parser(value_parser!(u32))
                                .help("Day of month, clamped in shorter months"),
                        )
                        .arg(date_arg("start", "First month the entry applies").required(true))
                        .arg(date_arg("end", "Optional last date")),
                )
                .subcommand(json_flags(Command::new("list")))
                .subcommand(
                    Command::new("pause")
                        .arg(Arg::new("id").required(true).value_parser(value_parser!(i64))),
                )
                .subcommand(
                    Command::new("resume")
                        .arg(Arg::new("id").required(true).value_parser(value_parser!(i64))),
                ),
        )
        .subcommand(
            Command::new("subscription")
                .about("Subscriptions")
                .subcommand(
                    Command::new("add")
                        .arg(Arg::new("name").required(true))
                        .arg(Arg::new("amount").long("amount").required(true))
                        .arg(
                            Arg::new("cycle")
                                .long("cycle")
                                .default_value("monthly")
                                .help("monthly, quarterly, semiannual or annual"),
                        )
                        .arg(date_arg("next", "Next renewal date").required(true)),
                )
                .subcommand(json_flags(Command::new("list")))
                .subcommand(
                    Command::new("pause")
                        .arg(Arg::new("id").required(true).value_parser(value_parser!(i64))),
                )
                .subcommand(
                    Command::new("resume")
                        .arg(Arg::new("id").required(true).value_parser(value_parser!(i64))),
                ),
        )
        .subcommand(
            Command::new("loan")
                .about("Loans")
                .subcommand(
                    Command::new("add")
                        .arg(Arg::new("name").required(true))
                        .arg(Arg::new("principal").long("principal").required(true))
                        .arg(
                            Arg::new("rate")
                                .long("rate")
                                .required(true)
                                .help("Annual rate as a fraction, e.g. 0.05"),
                        )
                        .arg(
                            Arg::new("periods")
                                .long("periods")
                                .required(true)
                                .value_parser(value_parser!(i64)),
                        )
                        .arg(Arg::new("payment").long("payment").required(true))
                        .arg(
                            Arg::new("day")
                                .long("day")
                                .value_parser(value_parser!(u32)),
                        )
                        .arg(date_arg("start", "First payment date").required(true)),
                )
                .subcommand(json_flags(Command::new("list")))
                .subcommand(json_flags(
                    Command::new("schedule")
                        .about("Amortization schedule")
                        .arg(Arg::new("id").required(true).value_parser(value_parser!(i64))),
                ))
                .subcommand(
                    Command::new("pay")
                        .about("Record one payment")
                        .arg(Arg::new("id").required(true).value_parser(value_parser!(i64)))
                        .arg(date_arg("date", "Payment date (default today)")),
                )
                .subcommand(
                    Command::new("reverse")
                        .about("Reverse the most recent payment")
                        .arg(Arg::new("id").required(true).value_parser(value_parser!(i64))),
                ),
        )
        .subcommand(
            Command::new("installment")
                .about("Installment plans")
                .subcommand(
                    Command::new("add")
                        .arg(Arg::new("name").required(true))
                        .arg(Arg::new("total").long("total").required(true))
                        .arg(
                            Arg::new("periods")
                                .long("periods")
                                .required(true)
                                .value_parser(value_parser!(i64)),
                        )
                        .arg(
                            Arg::new("day")
                                .long("day")
                                .value_parser(value_parser!(u32)),
                        )
                        .arg(date_arg("start", "First installment date").required(true))
                        .arg(
                            Arg::new("direction")
                                .long("direction")
                                .default_value("expense"),
                        ),
                )
                .subcommand(json_flags(Command::new("list")))
                .subcommand(json_flags(
                    Command::new("status")
                        .about("Derived status and progress")
                        .arg(Arg::new("id").required(true).value_parser(value_parser!(i64))),
                ))
                .subcommand(
                    Command::new("pay")
                        .about("Record one installment")
                        .arg(Arg::new("id").required(true).value_parser(value_parser!(i64)))
                        .arg(date_arg("date", "Payment date (default today)")),
                )
                .subcommand(
                    Command::new("reverse")
                        .about("Reverse the most recent installment")
                        .arg(Arg::new("id").required(true).value_parser(value_parser!(i64))),
                ),
        )
        .subcommand(json_flags(
            Command::new("aggregate")
                .about("Actual plus deduplicated projected cash flow for a range")
                .arg(date_arg("from", "Range start").required(true))
                .arg(date_arg("to", "Range end").required(true)),
        ))
        .subcommand(json_flags(
            Command::new("forecast")
                .about("Period-by-period balance projection")
                .arg(
                    Arg::new("months")
                        .long("months")
                        .value_parser(value_parser!(usize))
                        .conflicts_with("weeks"),
                )
                .arg(
                    Arg::new("weeks")
                        .long("weeks")
                        .value_parser(value_parser!(usize)),
                )
                .arg(
                    Arg::new("adjust-balance")
                        .long("adjust-balance")
                        .allow_hyphen_values(true)
                        .help("What-if opening balance delta"),
                )
                .arg(Arg::new("add-income").long("add-income").help("What-if recurring income"))
                .arg(
                    Arg::new("add-expense")
                        .long("add-expense")
                        .help("What-if recurring expense"),
                )
                .arg(
                    Arg::new("one-time")
                        .long("one-time")
                        .action(ArgAction::Append)
                        .value_name("PERIOD:AMOUNT")
                        .allow_hyphen_values(true)
                        .help("One-time adjustment, e.g. 3:-500"),
                ),
        ))
        .subcommand(
            Command::new("scenario")
                .about("Named what-if parameter sets")
                .subcommand(
                    Command::new("save")
                        .arg(Arg::new("name").required(true))
                        .arg(
                            Arg::new("adjust-balance")
                                .long("adjust-balance")
                                .allow_hyphen_values(true),
                        )
                        .arg(Arg::new("add-income").long("add-income"))
                        .arg(Arg::new("add-expense").long("add-expense"))
                        .arg(
                            Arg::new("one-time")
                                .long("one-time")
                                .action(ArgAction::Append)
                                .value_name("PERIOD:AMOUNT")
                                .allow_hyphen_values(true),
                        ),
                )
                .subcommand(json_flags(Command::new("list")))
                .subcommand(Command::new("delete").arg(Arg::new("name").required(true)))
                .subcommand(json_flags(
                    Command::new("run")
                        .arg(Arg::new("name").required(true))
                        .arg(
                            Arg::new("months")
                                .long("months")
                                .value_parser(value_parser!(usize))
                                .conflicts_with("weeks"),
                        )
                        .arg(
                            Arg::new("weeks")
                                .long("weeks")
                                .value_parser(value_parser!(usize)),
                        ),
                ))
                .subcommand(json_flags(
                    Command::new("compare")
                        .about("Scenario vs baseline, per period")
                        .arg(Arg::new("name").required(true))
                        .arg(
                            Arg::new("months")
                                .long("months")
                                .value_parser(value_parser!(usize))
                                .conflicts_with("weeks"),
                        )
                        .arg(
                            Arg::new("weeks")
                                .long("weeks")
                                .value_parser(value_parser!(usize)),
                        ),
                )),
        )
        .subcommand(
            Command::new("alerts")
                .about("Notifications")
                .subcommand(json_flags(
                    Command::new("generate")
                        .about("Regenerate alerts from current state")
                        .arg(date_arg("date", "Evaluation date (default today)")),
                ))
                .subcommand(json_flags(
                    Command::new("list").arg(
                        Arg::new("all")
                            .long("all")
                            .action(ArgAction::SetTrue)
                            .help("Include dismissed and snoozed alerts"),
                    ),
                ))
                .subcommand(Command::new("read").arg(Arg::new("key").required(true)))
                .subcommand(Command::new("dismiss").arg(Arg::new("key").required(true)))
                .subcommand(
                    Command::new("snooze")
                        .arg(Arg::new("key").required(true))
                        .arg(date_arg("until", "Snooze until this date").required(true)),
                ),
        )
        .subcommand(json_flags(
            Command::new("automation")
                .about("Materialize obligations due on a date")
                .arg(date_arg("date", "Reference date (default today)"))
                .arg(
                    Arg::new("preview")
                        .long("preview")
                        .action(ArgAction::SetTrue)
                        .help("Report what would be materialized without committing"),
                ),
        ))
        .subcommand(
            Command::new("fx")
                .about("Exchange rates")
                .subcommand(
                    Command::new("set-base").arg(Arg::new("currency").required(true)),
                )
                .subcommand(
                    Command::new("set")
                        .arg(date_arg("date", "Rate date").required(true))
                        .arg(Arg::new("base").long("base").required(true))
                        .arg(Arg::new("quote").long("quote").required(true))
                        .arg(Arg::new("rate").long("rate").required(true)),
                )
                .subcommand(Command::new("list"))
                .subcommand(
                    Command::new("convert")
                        .arg(date_arg("date", "Conversion date").required(true))
                        .arg(Arg::new("amount").required(true))
                        .arg(Arg::new("from").long("from").required(true))
                        .arg(Arg::new("to").long("to").required(true)),
                ),
        )
        .subcommand(Command::new("doctor").about("Integrity checks"))
}
