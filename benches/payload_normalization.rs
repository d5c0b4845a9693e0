use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rs_mcp_flow::{format_call_result, normalize_payload, CallToolResult, ContentBlock, ToolPayload};
use serde_json::json;

/// Benchmark normalisation of each recognised payload shape
fn bench_normalize_shapes(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize_payload");

    let shapes = [
        ("nested", json!({"tool": "get_price", "parameters": {"ticker": "AAPL"}})),
        ("tool_name", json!({"tool_name": "get_price", "ticker": "AAPL"})),
        ("name", json!({"name": "get_price", "ticker": "AAPL"})),
    ];
    for (label, shape) in shapes {
        let structured = ToolPayload::from(shape.clone());
        let text = ToolPayload::from(shape.to_string());

        group.bench_function(format!("{label}/structured"), |b| {
            b.iter(|| black_box(normalize_payload(black_box(&structured))))
        });
        group.bench_function(format!("{label}/text"), |b| {
            b.iter(|| black_box(normalize_payload(black_box(&text))))
        });
    }

    let prose = ToolPayload::from("what is the price of apple today?");
    group.bench_function("natural_language", |b| {
        b.iter(|| black_box(normalize_payload(black_box(&prose))))
    });

    group.finish();
}

/// Benchmark normalisation as the parameter mapping grows
fn bench_parameter_width(c: &mut Criterion) {
    let mut group = c.benchmark_group("parameter_width");

    for width in [1usize, 16, 128].iter() {
        let mut payload = serde_json::Map::new();
        payload.insert("tool_name".into(), json!("wide"));
        for i in 0..*width {
            payload.insert(format!("param_{i}"), json!(i));
        }
        let text = ToolPayload::from(serde_json::Value::Object(payload).to_string());

        group.bench_with_input(BenchmarkId::from_parameter(width), &text, |b, text| {
            b.iter(|| black_box(normalize_payload(black_box(text))))
        });
    }

    group.finish();
}

/// Benchmark result formatting for text and structured output
fn bench_format_results(c: &mut Criterion) {
    let mut group = c.benchmark_group("format_call_result");

    let text = CallToolResult {
        content: (0..8)
            .map(|i| ContentBlock::Text {
                text: format!("line {i}"),
            })
            .collect(),
        is_error: false,
        structured_content: None,
    };
    let structured = CallToolResult {
        content: vec![ContentBlock::Other(json!({"type": "image", "data": "AAAA"}))],
        is_error: false,
        structured_content: Some(json!({"prices": [1.0, 2.5, 3.25], "ticker": "AAPL"})),
    };

    group.bench_function("text_blocks", |b| {
        b.iter(|| black_box(format_call_result(black_box(&text))))
    });
    group.bench_function("structured", |b| {
        b.iter(|| black_box(format_call_result(black_box(&structured))))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_normalize_shapes,
    bench_parameter_width,
    bench_format_results
);
criterion_main!(benches);
