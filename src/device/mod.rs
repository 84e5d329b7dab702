//! User-Agent parsing for token provenance.

use woothee::parser::{Parser, WootheeResult};

use crate::storage::models::{DeviceInfo, DeviceKind};

/// Parse a User-Agent header into the advisory `DeviceInfo` stored on a token
pub fn parse_user_agent(user_agent: &str) -> DeviceInfo {
    let mut info = DeviceInfo {
        raw_user_agent: user_agent.to_string(),
        ..DeviceInfo::default()
    };

    if let Some(parsed) = Parser::new().parse(user_agent) {
        fill_from(&mut info, &parsed);
    }
    info
}

fn fill_from(info: &mut DeviceInfo, parsed: &WootheeResult<'_>) {
    info.kind = device_kind(parsed.category);
    info.browser = known(parsed.name);
    info.browser_version = known(parsed.version);
    info.os = known(parsed.os);
    info.os_version = known(&parsed.os_version);
}

fn device_kind(category: &str) -> DeviceKind {
    match category {
        "pc" => DeviceKind::Desktop,
        "smartphone" | "mobilephone" => DeviceKind::Mobile,
        "tablet" => DeviceKind::Tablet,
        "crawler" => DeviceKind::Bot,
        _ => DeviceKind::Unknown,
    }
}

/// woothee reports missing fields as "" or "UNKNOWN"
fn known(value: &str) -> Option<String> {
    match value {
        "" | "UNKNOWN" => None,
        v => Some(v.to_string()),
    }
}

impl DeviceInfo {
    /// Short human label, e.g. "Chrome on Windows 10 (Desktop)"
    pub fn summary(&self) -> String {
        let browser = self.browser.as_deref().unwrap_or("unknown client");
        match self.os.as_deref() {
            Some(os) => format!("{browser} on {os} ({:?})", self.kind),
            None => format!("{browser} ({:?})", self.kind),
        }
    }
}
