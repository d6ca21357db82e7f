//! Mock construction helpers

use insitu_steer::config::ReconnectPolicy;
use insitu_steer::pipeline::{PipelineTimings, RenderPipeline};
use insitu_steer::source::SourceRegistry;
use insitu_steer::topology::NeighbourTable;
use insitu_steer::types::Int3;
use insitu_steer::Result;
use mockall::mock;
use serde_json::{Map, Value};

mock! {
    pub Pipeline {}

    impl RenderPipeline for Pipeline {
        fn connect(&mut self, policy: ReconnectPolicy) -> Result<()>;
        fn disconnect(&mut self);
        fn set_quality(&mut self, quality: u32);
        fn update_position(&mut self, offset: Int3);
        fn update_neighbours(&mut self, table: &NeighbourTable);
        fn push_message(&mut self, message: Value);
        fn render(
            &mut self,
            step: u32,
            sources: &SourceRegistry,
            meta: &Map<String, Value>,
            paused: bool,
        ) -> Result<Option<Value>>;
        fn timings(&self) -> PipelineTimings;
    }
}

/// A mock pipeline accepting every call except `connect` and `render`
pub fn create_mock_pipeline() -> MockPipeline {
    let mut pipeline = MockPipeline::new();
    pipeline.expect_disconnect().returning(|| ());
    pipeline.expect_set_quality().returning(|_| ());
    pipeline.expect_update_position().returning(|_| ());
    pipeline.expect_update_neighbours().returning(|_| ());
    pipeline.expect_push_message().returning(|_| ());
    pipeline
        .expect_timings()
        .returning(PipelineTimings::default);
    pipeline
}
