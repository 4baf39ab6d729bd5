//! Metrics module
//!
//! Prometheus counters and histograms for uploads. The binary can dump them in
//! the text exposition format with [`gather_text`].

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, register_histogram_vec, Counter,
    CounterVec, Encoder, Histogram, HistogramVec, TextEncoder,
};

lazy_static! {
    // Upload metrics
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "ferry_uploads_total",
        "Total number of uploads",
        &["strategy", "status"]
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "ferry_upload_bytes_total",
        "Total bytes uploaded"
    ).unwrap();

    pub static ref UPLOAD_DURATION: HistogramVec = register_histogram_vec!(
        "ferry_upload_duration_seconds",
        "Upload duration in seconds",
        &["strategy"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]
    ).unwrap();

    // Multipart metrics
    pub static ref PARTS_TOTAL: CounterVec = register_counter_vec!(
        "ferry_parts_total",
        "Part upload attempts by outcome",
        &["status"]  // "success", "retry" or "failure"
    ).unwrap();

    pub static ref MULTIPART_PARTS: Histogram = register_histogram!(
        "ferry_multipart_parts",
        "Number of parts per multipart upload",
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0]
    ).unwrap();

    // Compression metrics
    pub static ref COMPRESSION_RATIO: Histogram = register_histogram!(
        "ferry_compression_ratio",
        "Compressed size divided by original size",
        vec![0.05, 0.1, 0.25, 0.5, 0.75, 0.9, 1.0, 1.5]
    ).unwrap();

    // Error metrics
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "ferry_errors_total",
        "Total errors",
        &["type"]
    ).unwrap();
}

/// Record a successful upload
pub fn record_upload_success(strategy: &str, bytes: u64) {
    UPLOADS_TOTAL.with_label_values(&[strategy, "success"]).inc();
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record a failed upload
pub fn record_upload_failure(strategy: &str) {
    UPLOADS_TOTAL.with_label_values(&[strategy, "failure"]).inc();
}

/// Record upload duration
pub fn record_upload_duration(strategy: &str, duration_secs: f64) {
    UPLOAD_DURATION
        .with_label_values(&[strategy])
        .observe(duration_secs);
}

/// Record one part attempt outcome
pub fn record_part(status: &str) {
    PARTS_TOTAL.with_label_values(&[status]).inc();
}

/// Record the part count of a completed multipart upload
pub fn record_multipart_parts(parts_count: usize) {
    MULTIPART_PARTS.observe(parts_count as f64);
}

/// Record a finished compression
pub fn record_compression(original_bytes: u64, compressed_bytes: u64) {
    if original_bytes > 0 {
        COMPRESSION_RATIO.observe(compressed_bytes as f64 / original_bytes as f64);
    }
}

/// Record an error
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

/// Render every registered metric in the Prometheus text format
pub fn gather_text() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
