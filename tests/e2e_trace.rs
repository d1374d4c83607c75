//! End-to-end trace pipeline scenarios.
//!
//! Run with: `cargo test --test e2e_trace`

use riptide::{
    flush_trace, open_trace_file, Net, Severity, TraceEvent, TraceFormat, TraceLogOptions, Void,
};

fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init();
}

fn options(dir: &std::path::Path, format: TraceFormat) -> TraceLogOptions {
    TraceLogOptions {
        directory: dir.to_path_buf(),
        process_name: "testproc".to_string(),
        log_group: "e2e".to_string(),
        format,
        roll_size: None,
        max_logs_size: None,
    }
}

fn read_all_trace_files(dir: &std::path::Path, extension: &str) -> String {
    let mut out = String::new();
    for name in riptide::trace::list_trace_files(dir, "testproc", extension) {
        out.push_str(&std::fs::read_to_string(dir.join(name)).unwrap());
    }
    out
}

/// Inverse of the JSON field escaping: `\"`, `\\`, `\n`, `\r`, `\xHH`.
fn json_unescape(escaped: &str) -> Vec<u8> {
    let bytes = escaped.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            match bytes[i + 1] {
                b'"' => {
                    out.push(b'"');
                    i += 2;
                }
                b'\\' => {
                    out.push(b'\\');
                    i += 2;
                }
                b'n' => {
                    out.push(b'\n');
                    i += 2;
                }
                b'r' => {
                    out.push(b'\r');
                    i += 2;
                }
                b'x' => {
                    let hex = std::str::from_utf8(&bytes[i + 2..i + 4]).unwrap();
                    out.push(u8::from_str_radix(hex, 16).unwrap());
                    i += 4;
                }
                other => panic!("unexpected escape: \\{}", other as char),
            }
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    out
}

#[test]
fn events_flush_to_a_json_file() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let net = Net::new();
    open_trace_file(&net, options(dir.path(), TraceFormat::Json)).unwrap();

    for step in 0..3 {
        TraceEvent::new("Step").detail("N", step).commit();
    }
    flush_trace(&net).block().unwrap();
    net.trace_log().close();

    let contents = read_all_trace_files(dir.path(), "json");
    let lines: Vec<&str> = contents.split("\r\n").filter(|l| !l.is_empty()).collect();
    assert_eq!(lines.len(), 3);
    for (step, line) in lines.iter().enumerate() {
        assert!(line.starts_with("{  \"Severity\": \"10\""), "line: {line}");
        assert!(line.ends_with('}'), "line: {line}");
        assert!(line.contains("\"Type\": \"Step\""));
        assert!(line.contains(&format!("\"N\": \"{step}\"")));
        assert!(line.contains("\"LogGroup\": \"e2e\""));
    }
}

#[test]
fn json_escaping_round_trips() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let net = Net::new();
    open_trace_file(&net, options(dir.path(), TraceFormat::Json)).unwrap();

    let payload = "a\"b\\c\nd\x01e";
    TraceEvent::new("EscapeTest")
        .detail("Payload", payload)
        .commit();
    flush_trace(&net).block().unwrap();
    net.trace_log().close();

    let contents = read_all_trace_files(dir.path(), "json");
    let line = contents
        .split("\r\n")
        .find(|l| l.contains("EscapeTest"))
        .expect("event missing");
    let start = line.find("\"Payload\": \"").expect("field missing") + "\"Payload\": \"".len();
    let end = line[start..]
        .find("\", \"")
        .map_or_else(|| start + line[start..].find('"').unwrap(), |n| start + n);
    let escaped = &line[start..end];
    assert_eq!(escaped, "a\\\"b\\\\c\\nd\\x01e");
    assert_eq!(json_unescape(escaped), payload.as_bytes());
}

#[test]
fn xml_events_are_single_elements() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let net = Net::new();
    open_trace_file(&net, options(dir.path(), TraceFormat::Xml)).unwrap();

    TraceEvent::new("XmlCheck").detail("Angle", "<&>").commit();
    flush_trace(&net).block().unwrap();
    net.trace_log().close();

    let contents = read_all_trace_files(dir.path(), "xml");
    assert!(contents.starts_with("<?xml version=\"1.0\"?>"));
    assert!(contents.contains("<Event Severity=\"10\""));
    assert!(contents.contains("Type=\"XmlCheck\""));
    assert!(contents.contains("Angle=\"&lt;&amp;&gt;\""));
    assert!(contents.trim_end().ends_with("</Trace>"));
}

#[test]
fn preopen_events_are_replayed_after_open() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let net = Net::new();

    TraceEvent::new("BeforeOpen").detail("Seq", 1).commit();
    assert!(!net.trace_log().is_open());

    open_trace_file(&net, options(dir.path(), TraceFormat::Json)).unwrap();
    flush_trace(&net).block().unwrap();
    net.trace_log().close();

    let contents = read_all_trace_files(dir.path(), "json");
    let line = contents
        .split("\r\n")
        .find(|l| l.contains("BeforeOpen"))
        .expect("pre-open event missing");
    // Pre-open events pick up the annotations at open time.
    assert!(line.contains("\"LogGroup\": \"e2e\""));
}

#[test]
fn rolling_reemits_tracked_snapshots() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let net = Net::new();
    let mut opts = options(dir.path(), TraceFormat::Json);
    opts.roll_size = Some(256);
    open_trace_file(&net, opts).unwrap();

    TraceEvent::new("Snapshot")
        .detail("Payload", "x".repeat(200))
        .track_latest("Snapshot")
        .commit();
    flush_trace(&net).block().unwrap();

    TraceEvent::new("Filler")
        .detail("Payload", "y".repeat(200))
        .commit();
    // This flush crosses the roll threshold.
    flush_trace(&net).block().unwrap();
    // And this one writes the re-seeded snapshots into the fresh file.
    flush_trace(&net).block().unwrap();
    net.trace_log().close();

    let files = riptide::trace::list_trace_files(dir.path(), "testproc", "json");
    assert!(files.len() >= 2, "expected a rolled file, got {files:?}");
    let contents = read_all_trace_files(dir.path(), "json");
    assert!(contents.contains("\"TrackLatestType\": \"Rolled\""));
    assert!(contents.contains("\"OriginalTime\""));
}

#[test]
fn old_files_are_deleted_beyond_the_size_budget() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let net = Net::new();
    let mut opts = options(dir.path(), TraceFormat::Json);
    opts.roll_size = Some(64);
    opts.max_logs_size = Some(600);
    open_trace_file(&net, opts).unwrap();

    for round in 0..8 {
        TraceEvent::new("Churn")
            .detail("Round", round)
            .detail("Payload", "z".repeat(150))
            .commit();
        flush_trace(&net).block().unwrap();
    }
    net.trace_log().close();

    let files = riptide::trace::list_trace_files(dir.path(), "testproc", "json");
    assert!(
        files.len() < 8,
        "cleanup never deleted anything: {files:?}"
    );
}

#[test]
fn flush_barrier_wakes_a_suspended_actor() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let net = Net::new();
    open_trace_file(&net, options(dir.path(), TraceFormat::Json)).unwrap();

    TraceEvent::with_severity(Severity::Warn, "BarrierCheck").commit();
    let net2 = net.clone();
    let out = net.spawn(async move {
        flush_trace(&net2).await?;
        net2.stop();
        Ok(Void)
    });
    net.run();
    assert!(out.is_ready());
    assert!(!out.is_error());
    net.trace_log().close();

    let contents = read_all_trace_files(dir.path(), "json");
    assert!(contents.contains("BarrierCheck"));
}
