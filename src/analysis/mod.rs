// src/analysis/mod.rs
// 分析流水线: 采集存储 -> 时钟对齐 -> 分段 -> 平均 / 分类
pub mod align;
pub mod average;
pub mod classify;
pub mod epochs;
pub mod error;
pub mod filter;
pub mod plot;
pub mod source;
pub mod store;
// 公开导出常用类型
pub use align::{align_markers, IndexFit, MarkerAlignment};
pub use average::{average_by_class, ClassAverages, AVERAGE_WINDOW};
pub use classify::{
    classify_trials, fisher_criterion, winner_take_all, Classification, Decision,
    NoDecisionReason,
};
pub use epochs::{segment_trials, trial_len, TrialSet};
pub use error::AnalysisError;
pub use filter::{BandpassSettings, StreamingBandpass};
pub use plot::{render_class_grid_png, PlotStyle};
pub use source::{spawn_feed, FeedSink, ManualInlet, MarkerFeed, SampleFeed, StreamInlet};
pub use store::{RecordedData, Snapshot};
