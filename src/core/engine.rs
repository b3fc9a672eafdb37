use crate::domain::model::{BatchRequest, BatchRun};
use crate::domain::ports::Pipeline;
use crate::utils::error::Result;
use crate::utils::monitor::BatchMonitor;
use tracing::info;

pub struct BatchEngine<P: Pipeline> {
    pipeline: P,
    monitor: BatchMonitor,
}

impl<P: Pipeline> BatchEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self {
            pipeline,
            monitor: BatchMonitor::default(),
        }
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: BatchMonitor::new(monitor_enabled),
        }
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub fn run(&self, request: BatchRequest) -> Result<BatchRun> {
        let documents = request.documents.len();
        info!("🚀 Starting batch with {} documents", documents);

        let staged = self.pipeline.stage(request)?;
        self.monitor.log_phase("Staged", documents);

        let processed = self.pipeline.process(staged)?;
        self.monitor.log_phase("Processed", documents);

        let run = self.pipeline.package(processed)?;
        self.monitor.log_phase("Packaged", documents);

        info!(
            "📦 {} renamed, {} failed, output: {} ({})",
            run.report.renamed,
            run.report.failed,
            run.output.file_name(),
            run.output.kind()
        );
        self.monitor.log_final();

        Ok(run)
    }
}
