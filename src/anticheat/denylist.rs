use super::Severity;

/// Process names considered evidence of cheating tools, in their base form
/// (no platform suffix; normalization happens at scan time).
pub const DENYLIST: &[&str] = &[
    // AI/chat assistants
    "cluely",
    "chatgpt",
    "copilot",
    "codeium",
    "tabnine",
    "stackoverflow",
    // Communication apps
    "discord",
    "slack",
    "teams",
    "whatsapp",
    "telegram",
    "skype",
    // Screen sharing / remote control
    "zoom",
    "anydesk",
    "teamviewer",
    "ultraviewer",
    "chrome-remote-desktop",
    // Recording / streaming
    "obs",
    "obs64",
    "streamlabs",
    "xsplit",
    "camtasia",
    // Development tools that could aid cheating
    "postman",
    "insomnia",
    "fiddler",
    "wireshark",
    // Browsers (may be allowed in some contexts)
    "chrome",
    "firefox",
    "msedge",
    "edge",
    "opera",
    "brave",
];

/// Explicit severity entries; any denylist match without one classifies as
/// [`Severity::Medium`].
pub const SEVERITY_OVERRIDES: &[(&str, Severity)] = &[
    ("cluely", Severity::Critical),
    ("chatgpt", Severity::Critical),
    ("copilot", Severity::Critical),
    ("stackoverflow", Severity::Critical),
    ("anydesk", Severity::Critical),
    ("teamviewer", Severity::Critical),
    ("discord", Severity::High),
    ("slack", Severity::High),
    ("teams", Severity::High),
    ("zoom", Severity::High),
    ("obs", Severity::High),
    ("chrome", Severity::Medium),
    ("firefox", Severity::Medium),
    ("msedge", Severity::Medium),
    ("edge", Severity::Medium),
];
