use super::{PredicateDescriptor, PredicateKind, PredicateSet, ValueDomain};

const HTTP_METHODS: &[&str] = &[
    "GET", "HEAD", "POST", "PUT", "DELETE", "PATCH", "OPTIONS", "CONNECT", "TRACE",
];

const FTP_COMMANDS: &[&str] = &[
    "USER", "PASS", "CWD", "PWD", "LIST", "NLST", "RETR", "STOR", "DELE", "MKD", "RMD", "RNFR",
    "RNTO", "SITE", "PORT", "PASV", "TYPE", "QUIT",
];

fn one_of(values: &[&str]) -> ValueDomain {
    ValueDomain::OneOf {
        values: values.iter().map(|v| v.to_string()).collect(),
    }
}

fn size() -> ValueDomain {
    ValueDomain::Integer {
        min: Some(0),
        max: None,
    }
}

fn set(entries: Vec<(&str, PredicateDescriptor)>) -> PredicateSet {
    entries
        .into_iter()
        .map(|(id, descriptor)| (id.to_string(), descriptor))
        .collect()
}

/// Predicates shared by every stream-oriented protocol.
fn stream_predicates() -> Vec<(&'static str, PredicateDescriptor)> {
    vec![
        (
            "payload_regex",
            PredicateDescriptor::new(
                PredicateKind::PayloadMatches,
                ValueDomain::Regex,
                "Payload matches the regular expression",
            ),
        ),
        (
            "payload_contains",
            PredicateDescriptor::new(
                PredicateKind::PayloadContains,
                ValueDomain::Text,
                "Payload contains the substring",
            ),
        ),
        (
            "min_size",
            PredicateDescriptor::new(
                PredicateKind::SizeAtLeast,
                size(),
                "Payload is at least this many bytes",
            ),
        ),
        (
            "max_size",
            PredicateDescriptor::new(
                PredicateKind::SizeAtMost,
                size(),
                "Payload is at most this many bytes",
            ),
        ),
        (
            "client_network",
            PredicateDescriptor::new(
                PredicateKind::PeerInNetwork,
                ValueDomain::Cidr,
                "Client address lies inside the network",
            ),
        ),
    ]
}

pub(super) fn definitions() -> Vec<(&'static str, PredicateSet)> {
    let mut http = stream_predicates();
    http.extend([
        (
            "method",
            PredicateDescriptor::new(
                PredicateKind::CommandIs,
                one_of(HTTP_METHODS),
                "Request method",
            ),
        ),
        (
            "path_regex",
            PredicateDescriptor::new(
                PredicateKind::TargetMatches,
                ValueDomain::Regex,
                "Request path and query match the regular expression",
            ),
        ),
        (
            "header_regex",
            PredicateDescriptor::new(
                PredicateKind::HeaderMatches,
                ValueDomain::HeaderPattern,
                "Named request header matches the regular expression",
            ),
        ),
    ]);

    let mut ftp = stream_predicates();
    ftp.extend([
        (
            "command",
            PredicateDescriptor::new(
                PredicateKind::CommandIs,
                one_of(FTP_COMMANDS),
                "FTP command verb",
            ),
        ),
        (
            "argument_regex",
            PredicateDescriptor::new(
                PredicateKind::TargetMatches,
                ValueDomain::Regex,
                "FTP command argument matches the regular expression",
            ),
        ),
    ]);

    vec![
        ("http", set(http)),
        ("ftp", set(ftp)),
        ("tcp", set(stream_predicates())),
    ]
}
