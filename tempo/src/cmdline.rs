use clap::{Arg, ArgAction, Command, value_parser};

pub(super) const REORDER: &str = "reorder";

pub(super) const ARG_POLICY: &str = "policy";
pub(super) const ARG_LAG: &str = "lag";
pub(super) const ARG_PERIOD: &str = "period";
pub(super) const ARG_DIAGNOSTICS: &str = "diagnostics";
pub(super) const ARG_NAME: &str = "name";

pub(super) fn root_cli() -> Command {
    Command::new("tempo")
        .author("Tempo Authors")
        .about("Tempo reorders out-of-order event streams by event time")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(add_reorder_subcommand())
}

fn add_reorder_subcommand() -> Command {
    Command::new(REORDER)
        .about("Reads JSON events from stdin and writes them to stdout in event time order")
        .long_about(
            "Reads JSON events from stdin and writes them to stdout in event time order. \
             The flags are ignored when TEMPO_INGRESS_OBJECT is set.",
        )
        .arg(
            Arg::new(ARG_POLICY)
                .long(ARG_POLICY)
                .help("What to do with an event arriving more than `lag` behind the watermark")
                .value_parser(["drop", "throw", "adjust"])
                .default_value("drop"),
        )
        .arg(
            Arg::new(ARG_LAG)
                .long(ARG_LAG)
                .help("Tolerated lateness in timestamp units")
                .value_parser(value_parser!(u64))
                .default_value("0"),
        )
        .arg(
            Arg::new(ARG_PERIOD)
                .long(ARG_PERIOD)
                .help("Emit a punctuation every `period` timestamp units of released events")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_DIAGNOSTICS)
                .long(ARG_DIAGNOSTICS)
                .help("Log every dropped or adjusted event")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_NAME)
                .long(ARG_NAME)
                .help("Pipeline name used in logs and metrics")
                .default_value("stdin"),
        )
}
