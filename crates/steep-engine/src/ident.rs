//! Identifier sanitation and object naming conventions.
//!
//! Every replication object Steep creates follows a fixed naming scheme:
//! - subscriptions: `steep_sub_<target>_from_<source>`
//! - publications:  `steep_pub_<node>`
//! - prepared init slots: `steep_init_<node>`
//! - snapshot slots: `steep_snap_<snapshot_id>`
//!
//! Node ids and snapshot ids are sanitized first: lowercased, every
//! non-alphanumeric byte replaced by `_`. Names are truncated to the
//! engine's identifier limit.

use steep_types::NodeId;

/// Engine identifier length limit (NAMEDATALEN - 1).
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Lowercases and replaces non-alphanumeric characters with `_`.
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

fn truncate(mut name: String) -> String {
    name.truncate(MAX_IDENTIFIER_LEN);
    name
}

/// Subscription name on `target` streaming from `source`.
pub fn subscription_name(target: &NodeId, source: &NodeId) -> String {
    truncate(format!(
        "steep_sub_{}_from_{}",
        sanitize(target.as_str()),
        sanitize(source.as_str())
    ))
}

/// Prefix matching every subscription owned by `target`.
pub fn subscription_prefix(target: &NodeId) -> String {
    format!("steep_sub_{}_from_", sanitize(target.as_str()))
}

/// Publication name on `node`.
pub fn publication_name(node: &NodeId) -> String {
    truncate(format!("steep_pub_{}", sanitize(node.as_str())))
}

/// Default prepared-init slot name for `node`.
pub fn init_slot_name(node: &NodeId) -> String {
    truncate(format!("steep_init_{}", sanitize(node.as_str())))
}

/// Slot name binding a snapshot's consistent point.
pub fn snapshot_slot_name(snapshot_id: &str) -> String {
    truncate(format!("steep_snap_{}", sanitize(snapshot_id)))
}

/// Session replication origin used to tag reinit truncates.
pub const REINIT_ORIGIN: &str = "steep_reinit";

/// Double-quotes an identifier, escaping embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Single-quotes a literal, escaping embedded quotes.
pub fn quote_literal(lit: &str) -> String {
    format!("'{}'", lit.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Node-A", "node_a")]
    #[test_case("pgha.east.1", "pgha_east_1")]
    #[test_case("plain", "plain")]
    #[test_case("UPPER", "upper")]
    #[test_case("sp ace", "sp_ace")]
    fn sanitize_cases(raw: &str, expected: &str) {
        assert_eq!(sanitize(raw), expected);
    }

    #[test]
    fn naming_conventions() {
        let a = NodeId::new("A");
        let b = NodeId::new("B");
        assert_eq!(subscription_name(&b, &a), "steep_sub_b_from_a");
        assert_eq!(publication_name(&a), "steep_pub_a");
        assert_eq!(init_slot_name(&a), "steep_init_a");
        assert_eq!(
            snapshot_slot_name("01c9e1f2-aaaa-bbbb-cccc-0123456789ab"),
            "steep_snap_01c9e1f2_aaaa_bbbb_cccc_0123456789ab"
        );
    }

    #[test]
    fn names_respect_identifier_limit() {
        let long = NodeId::new("x".repeat(100));
        assert_eq!(subscription_name(&long, &long).len(), MAX_IDENTIFIER_LEN);
        assert_eq!(publication_name(&long).len(), MAX_IDENTIFIER_LEN);
        assert_eq!(init_slot_name(&long).len(), MAX_IDENTIFIER_LEN);
    }

    #[test]
    fn quoting() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_literal("it's"), "'it''s'");
    }
}
