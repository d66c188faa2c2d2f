use beacon_common::{DeviceClass, DeviceInfo};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::page::PageContext;

static MOBILE_UA: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?i)Android|webOS|iPhone|iPad|iPod|BlackBerry|IEMobile|Opera Mini").ok()
});

static TABLET_UA: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?i)iPad|Android.*Tablet").ok());

fn matches(pattern: &Lazy<Option<Regex>>, user_agent: &str) -> bool {
    pattern
        .as_ref()
        .map(|re| re.is_match(user_agent))
        .unwrap_or(false)
}

/// Tablets are only recognised among user agents that already look mobile.
pub fn classify(user_agent: &str) -> DeviceClass {
    if !matches(&MOBILE_UA, user_agent) {
        return DeviceClass::Desktop;
    }
    if matches(&TABLET_UA, user_agent) {
        DeviceClass::Tablet
    } else {
        DeviceClass::Mobile
    }
}

pub fn snapshot(page: &dyn PageContext) -> DeviceInfo {
    let navigator = page.navigator();
    DeviceInfo {
        class: classify(&navigator.user_agent),
        user_agent: navigator.user_agent,
        screen: page.screen(),
        viewport: page.viewport(),
        language: navigator.language,
        timezone: page.timezone(),
        cookies_enabled: navigator.cookies_enabled,
        online: navigator.online,
    }
}
