use crate::pipeline::InferencePipeline;
use std::sync::Arc;

#[derive(Clone)]
pub struct MoodServiceState {
    inner: Arc<MoodServiceStateInner>,
}

struct MoodServiceStateInner {
    node_id: String,
    pipeline: Arc<InferencePipeline>,
    max_upload_bytes: usize,
}

impl MoodServiceState {
    pub fn new(node_id: String, pipeline: InferencePipeline, max_upload_bytes: usize) -> Self {
        Self {
            inner: Arc::new(MoodServiceStateInner {
                node_id,
                pipeline: Arc::new(pipeline),
                max_upload_bytes,
            }),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    /// Shared handle for moving the pipeline onto a blocking thread
    pub fn pipeline(&self) -> Arc<InferencePipeline> {
        Arc::clone(&self.inner.pipeline)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.inner.max_upload_bytes
    }
}
