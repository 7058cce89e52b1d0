/// Configuration for pipeline behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Bytes held back before the first flush to the destination.
    /// `None` buffers the complete response.
    pub output_buffer_size: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            output_buffer_size: None, // Complete response
        }
    }
}

impl PipelineConfig {
    pub fn streaming(buffer_size: usize) -> Self {
        PipelineConfig {
            output_buffer_size: Some(buffer_size),
        }
    }
}
