use thiserror::Error;
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("filter used before samplerate and channel count were configured")]
    NotConfigured,
    #[error("sample rate must be greater than zero, got {0}")]
    InvalidSampleRate(f64),
    #[error("channel count mismatch: expected {expected}, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },
    #[error("invalid band edges {low} Hz .. {high} Hz for a sample rate of {sample_rate} Hz")]
    InvalidCutoff { low: f64, high: f64, sample_rate: f64 },
    #[error("no continuous samples recorded yet")]
    EmptyHistory,
    #[error("channel {channel} out of range for {channel_count} channels")]
    InvalidChannel { channel: usize, channel_count: usize },
    #[error("failed to render plot: {0}")]
    Plot(String),
}
impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for AnalysisError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        AnalysisError::Plot(format!("{value:?}"))
    }
}
impl From<image::ImageError> for AnalysisError {
    fn from(value: image::ImageError) -> Self {
        AnalysisError::Plot(value.to_string())
    }
}
