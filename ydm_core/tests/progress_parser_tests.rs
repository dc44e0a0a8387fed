use ydm_core::progress::parser::{classify, percentage_of, ProgressLine, ProgressParser};
use ydm_core::types::types::{ParseError, ProgressStage};

fn download_line(url: &str, status: &str, downloaded: &str, total: &str, estimate: &str) -> String {
    format!(
        r#"{{"type":"download","title":"Clip","url":"{}","status":"{}","downloadedBytes":{},"totalBytes":{},"totalBytesEstimate":{},"eta":"NA","speed":1024.5}}"#,
        url, status, downloaded, total, estimate
    )
}

// ---------------------------------------------------------------
// classify
// ---------------------------------------------------------------

#[test]
fn test_json_download_line_is_decoded() {
    let line = download_line("https://example.com/a", "downloading", "250", "1000", "null");
    match classify(&line).unwrap() {
        ProgressLine::Json(raw) => {
            assert_eq!(raw.url.as_deref(), Some("https://example.com/a"));
            assert_eq!(raw.title.as_deref(), Some("Clip"));
            assert_eq!(raw.percentage, 25);
            assert_eq!(raw.downloaded_bytes, 250);
            assert_eq!(raw.total_bytes, 1000);
            assert_eq!(raw.speed_bytes_per_sec, 1024);
            assert_eq!(raw.eta_seconds, 0, "NA eta decodes to zero");
            assert!(!raw.finished);
        }
        other => panic!("expected Json, got {:?}", other),
    }
}

#[test]
fn test_json_falls_back_to_estimated_total() {
    let line = download_line("https://example.com/a", "downloading", "500", "\"NA\"", "2000");
    let ProgressLine::Json(raw) = classify(&line).unwrap() else {
        panic!("expected Json");
    };
    assert_eq!(raw.total_bytes, 2000);
    assert_eq!(raw.percentage, 25);
}

#[test]
fn test_unknown_total_gives_zero_percent() {
    let line = download_line("https://example.com/a", "downloading", "500", "null", "\"Unknown\"");
    let ProgressLine::Json(raw) = classify(&line).unwrap() else {
        panic!("expected Json");
    };
    assert_eq!(raw.total_bytes, 0);
    assert_eq!(raw.percentage, 0);
    assert_eq!(percentage_of(12345, 0), 0);
}

#[test]
fn test_percentage_is_floored_and_clamped() {
    assert_eq!(percentage_of(999, 1000), 99);
    assert_eq!(percentage_of(1000, 1000), 100);
    assert_eq!(percentage_of(5000, 1000), 100);
}

#[test]
fn test_legacy_line_is_decoded() {
    let line = "[download]  42.5% of ~  10.00MiB at  1.00MiB/s ETA 01:05";
    match classify(line).unwrap() {
        ProgressLine::LegacyText(raw) => {
            assert_eq!(raw.url, None);
            assert_eq!(raw.percentage, 42);
            assert_eq!(raw.total_bytes, 10 * 1024 * 1024);
            assert_eq!(raw.speed_bytes_per_sec, 1024 * 1024);
            assert_eq!(raw.eta_seconds, 65);
        }
        other => panic!("expected LegacyText, got {:?}", other),
    }
}

#[test]
fn test_legacy_line_with_unknown_fields() {
    let line = "[download]   3.0% of Unknown at Unknown ETA Unknown";
    let ProgressLine::LegacyText(raw) = classify(line).unwrap() else {
        panic!("expected LegacyText");
    };
    assert_eq!(raw.percentage, 3);
    assert_eq!(raw.total_bytes, 0);
    assert_eq!(raw.speed_bytes_per_sec, 0);
    assert_eq!(raw.eta_seconds, 0);
}

#[test]
fn test_banner_is_unrecognized_with_url_hint() {
    let line = "[youtube] Extracting URL: https://www.youtube.com/watch?v=abc";
    assert_eq!(
        classify(line).unwrap(),
        ProgressLine::Unrecognized {
            url_hint: Some("https://www.youtube.com/watch?v=abc".to_string())
        }
    );
    assert_eq!(
        classify("[info] Writing video metadata").unwrap(),
        ProgressLine::Unrecognized { url_hint: None }
    );
}

#[test]
fn test_malformed_json_is_a_parse_error() {
    let err = classify(r#"{"type":"download","url": "#).unwrap_err();
    assert!(matches!(err, ParseError::Json(_)));
}

// ---------------------------------------------------------------
// ProgressParser
// ---------------------------------------------------------------

#[test]
fn test_first_event_for_url_always_passes() {
    let mut parser = ProgressParser::new();
    let ev = parser
        .feed(&download_line("https://example.com/a", "downloading", "0", "1000", "null"))
        .unwrap()
        .expect("first event");
    assert_eq!(ev.url, "https://example.com/a");
    assert_eq!(ev.percentage, 0);
    assert_eq!(ev.title, "Clip");
}

#[test]
fn test_dedup_keeps_per_url_percentages_increasing() {
    let mut parser = ProgressParser::new();
    let url = "https://example.com/a";
    let mut emitted = Vec::new();

    for downloaded in [0, 1, 5, 9, 10, 19, 20, 20, 35, 34, 99, 100] {
        let line = download_line(url, "downloading", &(downloaded * 10).to_string(), "1000", "null");
        if let Some(ev) = parser.feed(&line).unwrap() {
            emitted.push(ev.percentage);
        }
    }

    assert_eq!(emitted, vec![0, 1, 5, 9, 10, 19, 20, 35, 99, 100]);
    for pair in emitted.windows(2) {
        assert!(pair[1] >= pair[0] + 1, "not advancing: {:?}", emitted);
    }
}

#[test]
fn test_dedup_suppresses_repeats_and_regressions() {
    let mut parser = ProgressParser::new();
    let url = "https://example.com/a";
    let feed = |parser: &mut ProgressParser, d: u64| {
        parser
            .feed(&download_line(url, "downloading", &d.to_string(), "1000", "null"))
            .unwrap()
            .map(|ev| ev.percentage)
    };

    assert_eq!(feed(&mut parser, 100), Some(10));
    assert_eq!(feed(&mut parser, 105), None, "10.5% floors to 10");
    assert_eq!(feed(&mut parser, 90), None, "regression");
    assert_eq!(feed(&mut parser, 110), Some(11));
    assert_eq!(feed(&mut parser, 500), Some(50));
}

#[test]
fn test_hundred_percent_is_always_forced() {
    let mut parser = ProgressParser::new();
    let url = "https://example.com/a";

    let first = parser
        .feed(&download_line(url, "downloading", "1000", "1000", "null"))
        .unwrap();
    assert_eq!(first.map(|e| e.percentage), Some(100));

    // Second stream (audio after video) reaching 100 again still passes.
    let again = parser
        .feed(&download_line(url, "finished", "2000", "2000", "null"))
        .unwrap();
    assert_eq!(again.map(|e| e.percentage), Some(100));
}

#[test]
fn test_postprocess_finished_becomes_hundred_percent() {
    let mut parser = ProgressParser::new();
    parser
        .feed(&download_line("https://example.com/a", "downloading", "500", "1000", "null"))
        .unwrap();

    let started = r#"{"type":"postprocess","title":"Clip","url":"https://example.com/a","status":"started"}"#;
    let ev = parser.feed(started).unwrap().expect("stage start is reported");
    assert_eq!(ev.stage, ProgressStage::PostProcessing);
    assert!(!ev.is_complete());

    let finished = r#"{"type":"postprocess","title":"Clip","url":"https://example.com/a","status":"finished"}"#;
    let ev = parser.feed(finished).unwrap().expect("synthetic completion");
    assert_eq!(ev.url, "https://example.com/a");
    assert_eq!(ev.percentage, 100);
    assert_eq!(ev.stage, ProgressStage::PostProcessed);
    assert!(ev.is_complete());
}

#[test]
fn test_download_finished_is_not_complete() {
    let mut parser = ProgressParser::new();
    let ev = parser
        .feed(&download_line("https://example.com/a", "finished", "1000", "1000", "null"))
        .unwrap()
        .expect("finished download is reported");
    assert_eq!(ev.percentage, 100);
    assert_eq!(ev.stage, ProgressStage::Download);
    assert!(!ev.is_complete(), "post-processing has not run yet");

    // Every post-processor line passes de-duplication, even at 100 already.
    let processing = r#"{"type":"postprocess","url":"https://example.com/a","status":"processing"}"#;
    let ev = parser.feed(processing).unwrap().expect("processing is reported");
    assert_eq!(ev.stage, ProgressStage::PostProcessing);
}

#[test]
fn test_legacy_lines_use_last_known_url() {
    let mut parser = ProgressParser::new();
    parser.set_url_hint("https://example.com/hint");

    let ev = parser
        .feed("[download]  12.0% of 1.00MiB at 10.00KiB/s ETA 00:10")
        .unwrap()
        .unwrap();
    assert_eq!(ev.url, "https://example.com/hint");

    parser
        .feed("[generic] Extracting URL: https://example.com/next")
        .unwrap();
    assert_eq!(parser.current_url(), Some("https://example.com/next"));

    let ev = parser
        .feed("[download]   1.0% of 1.00MiB at 10.00KiB/s ETA 00:10")
        .unwrap()
        .unwrap();
    assert_eq!(ev.url, "https://example.com/next");
    assert_eq!(ev.percentage, 1);
}

#[test]
fn test_percentages_are_tracked_per_url() {
    let mut parser = ProgressParser::new();
    parser
        .feed(&download_line("https://example.com/a", "downloading", "900", "1000", "null"))
        .unwrap();

    let ev = parser
        .feed(&download_line("https://example.com/b", "downloading", "100", "1000", "null"))
        .unwrap()
        .expect("new url starts its own sequence");
    assert_eq!(ev.url, "https://example.com/b");
    assert_eq!(ev.percentage, 10);
}

#[test]
fn test_parse_error_does_not_poison_parser() {
    let mut parser = ProgressParser::new();
    assert!(parser.feed("{broken").is_err());
    let ev = parser
        .feed(&download_line("https://example.com/a", "downloading", "10", "100", "null"))
        .unwrap();
    assert_eq!(ev.map(|e| e.percentage), Some(10));
}
