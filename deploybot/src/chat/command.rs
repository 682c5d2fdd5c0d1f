//! Command and button parsing

/// A slash command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Deploy,
    MyBots,
    Status(Option<String>),
    Logs(Option<String>),
    Stop(Option<String>),
    Restart(Option<String>),
    Delete(Option<String>),
    Stats,
    Cancel,
    Unknown(String),
}

/// Parse `text` as a command. `/done` and non-command text return `None`
/// so they reach the intake session.
pub fn parse_command(text: &str) -> Option<Command> {
    let text = text.trim();
    if !text.starts_with('/') {
        return None;
    }

    let mut parts = text.split_whitespace();
    let head = parts.next()?;
    // `/status@hostingbot demo` addresses a specific bot in group chats
    let command = head.split('@').next().unwrap_or(head).to_lowercase();
    let arg = parts.next().map(str::to_string);

    let parsed = match command.as_str() {
        "/done" => return None,
        "/start" => Command::Start,
        "/help" => Command::Help,
        "/deploy" => Command::Deploy,
        "/mybots" => Command::MyBots,
        "/status" => Command::Status(arg),
        "/logs" => Command::Logs(arg),
        "/stop" => Command::Stop(arg),
        "/restart" => Command::Restart(arg),
        "/delete" => Command::Delete(arg),
        "/stats" => Command::Stats,
        "/cancel" => Command::Cancel,
        _ => Command::Unknown(command),
    };
    Some(parsed)
}

/// Inline button payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Button {
    DeployNew,
    MyBots,
    RefreshMyBots,
    Stats,
    Help,
    BotInfo(String),
    ViewLogs(String),
    StopBot(String),
    RestartBot(String),
    DeleteBot(String),
    ConfirmDelete(String),
}

impl Button {
    /// Callback data carried by the button
    pub fn data(&self) -> String {
        match self {
            Button::DeployNew => "deploy_new".to_string(),
            Button::MyBots => "my_bots".to_string(),
            Button::RefreshMyBots => "refresh_mybots".to_string(),
            Button::Stats => "stats".to_string(),
            Button::Help => "help".to_string(),
            Button::BotInfo(name) => format!("bot_info_{}", name),
            Button::ViewLogs(name) => format!("view_logs_{}", name),
            Button::StopBot(name) => format!("stop_bot_{}", name),
            Button::RestartBot(name) => format!("restart_bot_{}", name),
            Button::DeleteBot(name) => format!("delete_bot_{}", name),
            Button::ConfirmDelete(name) => format!("confirm_delete_{}", name),
        }
    }
}

pub fn parse_button(data: &str) -> Option<Button> {
    let named: [(&str, fn(String) -> Button); 6] = [
        ("bot_info_", Button::BotInfo),
        ("view_logs_", Button::ViewLogs),
        ("stop_bot_", Button::StopBot),
        ("restart_bot_", Button::RestartBot),
        ("delete_bot_", Button::DeleteBot),
        ("confirm_delete_", Button::ConfirmDelete),
    ];

    match data {
        "deploy_new" => Some(Button::DeployNew),
        "my_bots" => Some(Button::MyBots),
        "refresh_mybots" => Some(Button::RefreshMyBots),
        "stats" => Some(Button::Stats),
        "help" => Some(Button::Help),
        _ => named.iter().find_map(|(prefix, build)| {
            data.strip_prefix(prefix)
                .filter(|name| !name.is_empty())
                .map(|name| build(name.to_string()))
        }),
    }
}
