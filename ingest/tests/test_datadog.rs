use std::io::Write;

use flate2::Compression;
use flate2::write::{GzEncoder, ZlibEncoder};
use ingest::{
    Config, ContentEncoding, Ingest, InsertError, PayloadFormat, Protocol, ReadError,
};
use ingest_datadog::sketches::{Dogsketch, Sketch, SketchPayload};
use ingest_datadog::v2;
use prost::Message;
use similar_asserts::assert_eq;

#[derive(Debug, PartialEq)]
struct StoreFull;

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn insert(
    ingest: &Ingest,
    protocol: Protocol,
    body: &[u8],
    encoding: ContentEncoding,
    content_type: &str,
) -> Vec<String> {
    let mut samples = Vec::new();

    ingest
        .insert_datadog(
            protocol,
            body,
            encoding,
            PayloadFormat::from_content_type(content_type),
            |sample| {
                samples.push(sample.to_string());
                Ok::<_, StoreFull>(())
            },
        )
        .unwrap();

    samples
}

const V1_BODY: &[u8] = br#"{
    "series": [
        {
            "metric": "system.disk.in_use",
            "host": "web-1",
            "device": "sda1",
            "type": "gauge",
            "interval": 10,
            "points": [[1700000000, 0.25], [1700000010, 0.5]],
            "tags": ["env:prod", "host:web-2"]
        },
        {
            "metric": "http.requests-total",
            "points": [[1700000000, 7]],
            "tags": ["route:/api/v1"]
        }
    ]
}"#;

#[test]
fn test_v1_compressed() {
    let ingest = Ingest::new(&Config::default());

    let expected = [
        r#"{__name__="system.disk.in_use",host="web-1",device="sda1",env="prod",exported_host="web-2"} 0.25 1700000000000"#,
        r#"{__name__="system.disk.in_use",host="web-1",device="sda1",env="prod",exported_host="web-2"} 0.5 1700000010000"#,
        r#"{__name__="http.requests_total",route="/api/v1"} 7 1700000000000"#,
    ];

    let identity = insert(&ingest, Protocol::V1, V1_BODY, ContentEncoding::Identity, "");
    assert_eq!(identity, expected);

    let gzipped = gzip(V1_BODY);
    let encoding = ContentEncoding::parse("gzip");
    let samples = insert(&ingest, Protocol::V1, &gzipped, encoding, "application/json");
    assert_eq!(samples, expected);

    let deflated = deflate(V1_BODY);
    let encoding = ContentEncoding::parse("deflate");
    let samples = insert(&ingest, Protocol::V1, &deflated, encoding, "application/json");
    assert_eq!(samples, expected);
}

#[test]
fn test_v1_unsanitized() {
    let config = Config::from_yaml("datadog:\n  sanitize_metric_names: false").unwrap();
    let ingest = Ingest::new(&config);

    let samples = insert(&ingest, Protocol::V1, V1_BODY, ContentEncoding::Identity, "");
    assert_eq!(
        samples[2],
        r#"{__name__="http.requests-total",route="/api/v1"} 7 1700000000000"#
    );
}

#[test]
fn test_v2_json_and_protobuf() {
    let ingest = Ingest::new(&Config::default());

    let json = br#"{"series":[{"metric":"cpu","resources":[{"type":"host","name":"db-1"}],"points":[{"timestamp":0,"value":1.5}],"tags":["core:0"]}]}"#;
    let samples = insert(
        &ingest,
        Protocol::V2,
        json,
        ContentEncoding::Identity,
        "application/json",
    );
    assert_eq!(samples, [r#"{__name__="cpu",host="db-1",core="0"} 1.5 0"#]);

    let payload = v2::Request {
        series: vec![v2::Series {
            resources: vec![v2::Resource {
                r#type: "host".to_owned(),
                name: "db-1".to_owned(),
            }],
            metric: "cpu".to_owned(),
            tags: vec!["core:0".to_owned()],
            points: vec![v2::Point {
                value: 1.5,
                timestamp: 0,
            }],
        }],
    };
    let body = gzip(&payload.encode_to_vec());
    let samples = insert(
        &ingest,
        Protocol::V2,
        &body,
        ContentEncoding::Gzip,
        "application/x-protobuf",
    );
    assert_eq!(samples, [r#"{__name__="cpu",host="db-1",core="0"} 1.5 0"#]);
}

#[test]
fn test_sketches() {
    let ingest = Ingest::new(&Config::default());

    let payload = SketchPayload {
        sketches: vec![Sketch {
            metric: "latency".to_owned(),
            host: "web-1".to_owned(),
            tags: vec!["env:prod".to_owned()],
            dogsketches: vec![Dogsketch {
                ts: 1_700_000_000,
                cnt: 2,
                min: 1.0,
                max: 3.0,
                avg: 2.0,
                sum: 4.0,
            }],
            ..Default::default()
        }],
    };

    let body = payload.encode_to_vec();
    let samples = insert(
        &ingest,
        Protocol::Sketches,
        &body,
        ContentEncoding::Identity,
        "application/x-protobuf",
    );

    insta::assert_debug_snapshot!(samples, @r#"
    [
        "{__name__=\"latency_max\",host=\"web-1\",env=\"prod\"} 3 1700000000000",
        "{__name__=\"latency_min\",host=\"web-1\",env=\"prod\"} 1 1700000000000",
        "{__name__=\"latency_cnt\",host=\"web-1\",env=\"prod\"} 2 1700000000000",
        "{__name__=\"latency_avg\",host=\"web-1\",env=\"prod\"} 2 1700000000000",
        "{__name__=\"latency_sum\",host=\"web-1\",env=\"prod\"} 4 1700000000000",
    ]
    "#);
}

#[test]
fn test_size_exceeded() {
    let config = Config::from_yaml("limits:\n  max_request_size: 16").unwrap();
    let ingest = Ingest::new(&config);

    let body = br#"{"series":[],"x":1}"#;
    assert_eq!(body.len(), 19);

    let error = ingest
        .insert_datadog(
            Protocol::V1,
            &body[..],
            ContentEncoding::Identity,
            PayloadFormat::Json,
            |_| Ok::<_, StoreFull>(()),
        )
        .unwrap_err();

    match error {
        InsertError::Read(error @ ReadError::SizeExceeded { limit: 16 }) => {
            insta::assert_snapshot!(error, @"request body exceeds the maximum size of 16 bytes")
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_callback_error() {
    let ingest = Ingest::new(&Config::default());

    let mut calls = 0;
    let error = ingest
        .insert_datadog(
            Protocol::V1,
            V1_BODY,
            ContentEncoding::Identity,
            PayloadFormat::Json,
            |_| {
                calls += 1;
                Err(StoreFull)
            },
        )
        .unwrap_err();

    assert_eq!(calls, 1);
    assert!(matches!(error, InsertError::Callback(StoreFull)));
}

#[test]
fn test_malformed_bodies() {
    let ingest = Ingest::new(&Config::default());

    for protocol in [Protocol::V1, Protocol::V2] {
        for body in ["", "foobar", r#"{"series":123"#, "1234", "[]"] {
            let result = ingest.insert_datadog(
                protocol,
                body.as_bytes(),
                ContentEncoding::Identity,
                PayloadFormat::Json,
                |_| Ok::<_, StoreFull>(()),
            );

            assert!(
                matches!(result, Err(InsertError::Decode(_))),
                "{protocol}: {body:?}"
            );
        }

        let count = ingest
            .insert_datadog(
                protocol,
                &b"{}"[..],
                ContentEncoding::Identity,
                PayloadFormat::Json,
                |_| Ok::<_, StoreFull>(()),
            )
            .unwrap();
        assert_eq!(count, 0);
    }
}

#[test]
fn test_sketch_callback_error() {
    let ingest = Ingest::new(&Config::default());

    let point = |ts| Dogsketch {
        ts,
        cnt: 1,
        min: 1.0,
        max: 1.0,
        avg: 1.0,
        sum: 1.0,
    };
    let payload = SketchPayload {
        sketches: vec![Sketch {
            metric: "latency".to_owned(),
            dogsketches: vec![point(10), point(20)],
            ..Default::default()
        }],
    };

    let mut seen = Vec::new();
    let error = ingest
        .insert_datadog(
            Protocol::Sketches,
            &payload.encode_to_vec()[..],
            ContentEncoding::Identity,
            PayloadFormat::Protobuf,
            |sample| {
                seen.push(sample.to_string());
                match seen.len() {
                    2 => Err(StoreFull),
                    _ => Ok(()),
                }
            },
        )
        .unwrap_err();

    assert!(matches!(error, InsertError::Callback(StoreFull)));
    assert_eq!(
        seen,
        [
            r#"{__name__="latency_max"} 1 10000"#,
            r#"{__name__="latency_max"} 1 20000"#,
        ]
    );
}

#[test]
fn test_v2_protobuf_callback_error() {
    let ingest = Ingest::new(&Config::default());

    let series = |metric: &str| v2::Series {
        metric: metric.to_owned(),
        points: vec![v2::Point {
            value: 1.0,
            timestamp: 1,
        }],
        ..Default::default()
    };
    let payload = v2::Request {
        series: vec![series("a"), series("b"), series("c")],
    };

    let mut calls = 0;
    let error = ingest
        .insert_datadog(
            Protocol::V2,
            &payload.encode_to_vec()[..],
            ContentEncoding::Identity,
            PayloadFormat::Protobuf,
            |_| {
                calls += 1;
                Err(StoreFull)
            },
        )
        .unwrap_err();

    assert_eq!(calls, 1);
    assert!(matches!(error, InsertError::Callback(StoreFull)));
}

#[test]
fn test_failure_metrics() {
    let config = Config::from_yaml("limits:\n  max_request_size: 16").unwrap();
    let ingest = Ingest::new(&config);

    let captures: Vec<_> = ingest_statsd::with_capturing_test_client(|| {
        let requests = [
            (Protocol::V2, &b"[]"[..]),
            (Protocol::V1, &br#"{"series":[],"x":1}"#[..]),
            (Protocol::V1, &br#"{"series":[]}"#[..]),
        ];

        for (protocol, body) in requests {
            ingest
                .insert_datadog(
                    protocol,
                    body,
                    ContentEncoding::Identity,
                    PayloadFormat::Json,
                    |_| Ok::<_, StoreFull>(()),
                )
                .ok();
        }
    })
    .into_iter()
    .filter(|metric| metric.starts_with("datadog.") || metric.starts_with("body.read.errors"))
    .collect();

    assert_eq!(
        captures,
        [
            "datadog.unmarshal.errors:1|c|#protocol:datadog_v2",
            "body.read.errors:1|c|#protocol:datadog_v1",
        ]
    );
}
