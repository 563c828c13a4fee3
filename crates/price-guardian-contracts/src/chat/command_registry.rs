#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

pub(crate) const PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "scan",
        action: "scan",
    },
    CommandSpec {
        command: "photo",
        action: "scan",
    },
];

pub(crate) const INDEX_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "buy",
        action: "open_offer",
    },
    CommandSpec {
        command: "open",
        action: "open_offer",
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "track",
        action: "toggle_track",
    },
    CommandSpec {
        command: "more",
        action: "scroll",
    },
    CommandSpec {
        command: "watchlist",
        action: "show_watchlist",
    },
    CommandSpec {
        command: "analytics",
        action: "show_analytics",
    },
    CommandSpec {
        command: "new",
        action: "reset",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
    },
];

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/scan <path>",
    "/track",
    "/buy [n]",
    "/more",
    "/watchlist",
    "/analytics",
    "/new",
    "/help",
    "/quit",
];
