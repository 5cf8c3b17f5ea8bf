//! Shared fixtures: in-memory exporters and metric lookups.

#![allow(dead_code)]

use opentelemetry::global::BoxedTracer;
use opentelemetry::metrics::MeterProvider as _;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{KeyValue, Value};
use opentelemetry_sdk::metrics::data::{AggregatedMetrics, MetricData, ResourceMetrics};
use opentelemetry_sdk::metrics::{InMemoryMetricExporter, PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider, SpanData};
use opentelemetry_serverless_wrapper::{ExecutionContext, ExecutionContextBuilder, WrapperConfig};

pub struct Telemetry {
    pub spans: InMemorySpanExporter,
    pub metrics: InMemoryMetricExporter,
    pub tracer_provider: SdkTracerProvider,
    pub meter_provider: SdkMeterProvider,
}

impl Telemetry {
    pub fn new() -> Self {
        let spans = InMemorySpanExporter::default();
        let tracer_provider = SdkTracerProvider::builder()
            .with_simple_exporter(spans.clone())
            .build();

        let metrics = InMemoryMetricExporter::default();
        let reader = PeriodicReader::builder(metrics.clone()).build();
        let meter_provider = SdkMeterProvider::builder().with_reader(reader).build();

        Self {
            spans,
            metrics,
            tracer_provider,
            meter_provider,
        }
    }

    fn tracer(&self) -> BoxedTracer {
        BoxedTracer::new(Box::new(self.tracer_provider.tracer("test")))
    }

    /// Context with both a tracer and a meter.
    pub fn context(&self, config: WrapperConfig) -> ExecutionContext {
        self.builder(config)
            .with_tracer(self.tracer())
            .with_meter(self.meter_provider.meter("test"))
            .build()
    }

    pub fn tracing_only_context(&self, config: WrapperConfig) -> ExecutionContext {
        self.builder(config).with_tracer(self.tracer()).build()
    }

    pub fn metrics_only_context(&self, config: WrapperConfig) -> ExecutionContext {
        self.builder(config)
            .with_meter(self.meter_provider.meter("test"))
            .build()
    }

    fn builder(&self, config: WrapperConfig) -> ExecutionContextBuilder {
        ExecutionContext::builder(config)
    }

    pub fn finished_spans(&self) -> Vec<SpanData> {
        self.spans.get_finished_spans().unwrap()
    }

    /// Flushes the meter provider and returns the latest cumulative export.
    pub fn collect(&self) -> Option<ResourceMetrics> {
        self.meter_provider.force_flush().unwrap();
        self.metrics.get_finished_metrics().unwrap().pop()
    }
}

pub fn content_tracing_config() -> WrapperConfig {
    WrapperConfig {
        content_tracing: true,
        ..WrapperConfig::default()
    }
}

pub fn span_attribute(span: &SpanData, key: &str) -> Option<Value> {
    span.attributes
        .iter()
        .find(|kv| kv.key.as_str() == key)
        .map(|kv| kv.value.clone())
}

pub fn has_metric(metrics: &ResourceMetrics, name: &str) -> bool {
    metrics
        .scope_metrics()
        .flat_map(|scope| scope.metrics())
        .any(|metric| metric.name() == name)
}

fn find_metric<'a>(metrics: &'a ResourceMetrics, name: &str) -> Option<&'a AggregatedMetrics> {
    metrics
        .scope_metrics()
        .flat_map(|scope| scope.metrics())
        .find(|metric| metric.name() == name)
        .map(|metric| metric.data())
}

fn sorted(attributes: impl Iterator<Item = KeyValue>) -> Vec<KeyValue> {
    let mut attributes: Vec<KeyValue> = attributes.collect();
    attributes.sort_by(|a, b| a.key.as_str().cmp(b.key.as_str()));
    attributes
}

/// `(value, attributes)` for each data point of an `i64` sum.
pub fn i64_sum_points(metrics: &ResourceMetrics, name: &str) -> Vec<(i64, Vec<KeyValue>)> {
    match find_metric(metrics, name) {
        Some(AggregatedMetrics::I64(MetricData::Sum(sum))) => sum
            .data_points()
            .map(|dp| (dp.value(), sorted(dp.attributes().cloned())))
            .collect(),
        _ => Vec::new(),
    }
}

/// `(count, sum, attributes)` for each data point of an `f64` histogram.
pub fn f64_histogram_points(metrics: &ResourceMetrics, name: &str) -> Vec<(u64, f64, Vec<KeyValue>)> {
    match find_metric(metrics, name) {
        Some(AggregatedMetrics::F64(MetricData::Histogram(histogram))) => histogram
            .data_points()
            .map(|dp| (dp.count(), dp.sum(), sorted(dp.attributes().cloned())))
            .collect(),
        _ => Vec::new(),
    }
}

/// `(count, sum, attributes)` for each data point of a `u64` histogram.
pub fn u64_histogram_points(metrics: &ResourceMetrics, name: &str) -> Vec<(u64, u64, Vec<KeyValue>)> {
    match find_metric(metrics, name) {
        Some(AggregatedMetrics::U64(MetricData::Histogram(histogram))) => histogram
            .data_points()
            .map(|dp| (dp.count(), dp.sum(), sorted(dp.attributes().cloned())))
            .collect(),
        _ => Vec::new(),
    }
}

/// Histogram bucket boundaries of an `f64` histogram's first data point.
pub fn f64_histogram_bounds(metrics: &ResourceMetrics, name: &str) -> Vec<f64> {
    match find_metric(metrics, name) {
        Some(AggregatedMetrics::F64(MetricData::Histogram(histogram))) => histogram
            .data_points()
            .next()
            .map(|dp| dp.bounds().collect())
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}
