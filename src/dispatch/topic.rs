//! Topic grammar.
//!
//! The transport strips the leading componentId segment before delivery;
//! everything here works on the remainder. Reserved shapes (partial
//! publish, get/set echoes, connection reports) parse to `Unhandled` so
//! the dispatcher can account for them without acting.

use crate::packet::types::Source;

/// Subscription filters installed per component wildcard.
pub const SUBSCRIPTION_TEMPLATES: [&str; 7] = [
    "+/system/info",
    "+/system/register/prop",
    "+/system/prop/#",
    "+/system/connections",
    "+/app/info",
    "+/app/register/prop",
    "+/app/prop/#",
];

/// The identity topic, also the only topic accepted before a component's
/// api version is known.
pub const SYSTEM_INFO_TOPIC: &str = "system/info";

/// Marker segment selecting a full-value publication.
const FULL_VALUE_MARKER: &str = ":";

/// What an inbound topic asks the dispatcher to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicAction {
    SystemInfo,
    AppInfo,
    RegisterProperty(Source),
    Log(Source),
    PropertyPublish { source: Source, path: String },
    Unhandled,
}

/// Parse a component-relative topic into an action.
pub fn parse_topic(topic: &str) -> TopicAction {
    let segments: Vec<&str> = topic.split('/').collect();
    match segments.as_slice() {
        ["system", "info"] => TopicAction::SystemInfo,
        ["app", "info"] => TopicAction::AppInfo,
        [source, "register", "prop"] => match Source::from_segment(source) {
            Some(source) => TopicAction::RegisterProperty(source),
            None => TopicAction::Unhandled,
        },
        [source, "log"] => match Source::from_segment(source) {
            Some(source) => TopicAction::Log(source),
            None => TopicAction::Unhandled,
        },
        [source, "prop", "pub", index, path @ ..] if !path.is_empty() => {
            match Source::from_segment(source) {
                Some(source) if *index == FULL_VALUE_MARKER => TopicAction::PropertyPublish {
                    source,
                    path: path.join("/"),
                },
                // Partial publications are reserved.
                Some(_) | None => TopicAction::Unhandled,
            }
        }
        _ => TopicAction::Unhandled,
    }
}

/// `<cid>/<source>/prop/set/<path>` - full-value set.
pub fn property_set_topic(component: &str, source: Source, path: &str) -> String {
    format!("{component}/{source}/prop/set/{path}")
}

/// `<cid>/<source>/prop/setn/<indexExpr>/<path>` - partial set (reserved).
pub fn property_set_partial_topic(
    component: &str,
    source: Source,
    index_expr: &str,
    path: &str,
) -> String {
    format!("{component}/{source}/prop/setn/{index_expr}/{path}")
}

/// `<cid>/<source>/prop/get/<path>` - get (reserved).
pub fn property_get_topic(component: &str, source: Source, path: &str) -> String {
    format!("{component}/{source}/prop/get/{path}")
}

/// `<cid>/device/command` - device command channel.
pub fn device_command_topic(component: &str) -> String {
    format!("{component}/device/command")
}
