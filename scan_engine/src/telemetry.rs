use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::collections::HashSet;

pub struct Metrics {
    request_counter: IntCounterVec,
    inference_counter: IntCounter,
    inference_failures: IntCounter,
    dropped_frames: IntCounter,
    published_predictions: IntCounter,
    inference_duration: Histogram,
    registry: Registry,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("scan_engine".to_string()), None)?;

        let request_counter = IntCounterVec::new(
            Opts::new("requests_total", "Total number of requests"),
            &["route"],
        )?;

        let inference_counter =
            IntCounter::new("inferences_total", "Total number of model inference calls")?;

        let inference_failures = IntCounter::new(
            "inference_failures_total",
            "Inference calls that ended in an error",
        )?;

        let dropped_frames = IntCounter::new(
            "frames_dropped_total",
            "Frames dropped because an inference was already in flight",
        )?;

        let published_predictions = IntCounter::new(
            "predictions_published_total",
            "Ranked prediction lists published as current result",
        )?;

        let boundaries = generate_boundaries((15, 30, 60, 500, 1000));

        let inference_duration = Histogram::with_opts(
            HistogramOpts::new(
                "inference_duration_ms",
                "Duration of inference calls in milliseconds",
            )
            .buckets(boundaries),
        )?;

        registry.register(Box::new(request_counter.clone()))?;
        registry.register(Box::new(inference_counter.clone()))?;
        registry.register(Box::new(inference_failures.clone()))?;
        registry.register(Box::new(dropped_frames.clone()))?;
        registry.register(Box::new(published_predictions.clone()))?;
        registry.register(Box::new(inference_duration.clone()))?;

        Ok(Metrics {
            request_counter,
            inference_counter,
            inference_failures,
            dropped_frames,
            published_predictions,
            inference_duration,
            registry,
        })
    }

    pub fn record_request(&self, route: &str) {
        self.request_counter.with_label_values(&[route]).inc();
    }

    pub fn record_inference(&self, duration_ms: f64) {
        self.inference_counter.inc();
        self.inference_duration.observe(duration_ms);
    }

    pub fn record_inference_failure(&self) {
        self.inference_failures.inc();
    }

    pub fn record_dropped_frame(&self) {
        self.dropped_frames.inc();
    }

    pub fn record_published_predictions(&self) {
        self.published_predictions.inc();
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.get()
    }

    pub fn render(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&metric_families, &mut buffer)?;

        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn generate_boundaries(parts: (i32, i32, i32, i32, i32)) -> Vec<f64> {
    let first_step: usize = 10;
    let middle_step: usize = 2;
    let end_step: usize = 20;
    let tail_step: usize = 100;
    let first_part = (parts.0..=parts.1).step_by(first_step);
    let middle_part = (parts.1..=parts.2).step_by(middle_step);
    let end_part = (parts.2..=parts.3).step_by(end_step);
    let tail_part = (parts.3..=parts.4).step_by(tail_step);

    let mut seen = HashSet::new();
    first_part
        .chain(middle_part)
        .chain(end_part)
        .chain(tail_part)
        .filter(|&x| seen.insert(x))
        .map(|x| x as f64)
        .collect()
}
