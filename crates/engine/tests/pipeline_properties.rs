//! Property tests: whatever the worker counts, the pipeline ends in the same
//! state as applying the lines one at a time.

use std::collections::BTreeMap;
use std::sync::Arc;

use meghaduta_engine::{IterLineSource, Pipeline, PipelineConfig};
use meghaduta_primitives::{ItemStore, ItemStoreOptions};
use proptest::prelude::*;

fn line_strategy() -> impl Strategy<Value = (u8, u8, u16, u64)> {
    (0u8..6, 0u8..3, any::<u16>(), 0u64..10_000)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn pipeline_matches_sequential_apply(
        lines in prop::collection::vec(line_strategy(), 1..300),
        parsers in 1usize..6,
        extractors in 1usize..6,
        partitions in 1usize..6,
    ) {
        let store = Arc::new(ItemStore::in_memory(ItemStoreOptions::default()));
        let config = PipelineConfig::default()
            .with_parser_workers(parsers)
            .with_extractor_workers(extractors)
            .with_materializer_workers(partitions)
            .with_channel_capacity(8);
        let pipeline = Pipeline::start(config, Arc::clone(&store)).unwrap();

        let text: Vec<String> = lines
            .iter()
            .map(|(id, name, value, ts)| format!("i{}\ta{}\t{}\t{}", id, name, value, ts))
            .collect();
        pipeline.run(&mut IterLineSource::new(text)).unwrap();
        let report = pipeline.finish().unwrap();
        prop_assert_eq!(report.stats.events_applied, lines.len() as u64);

        let mut expected: BTreeMap<u8, (BTreeMap<String, String>, u64)> = BTreeMap::new();
        for (id, name, value, ts) in &lines {
            let entry = expected.entry(*id).or_default();
            entry.0.insert(format!("a{}", name), value.to_string());
            entry.1 = *ts;
        }

        for (id, (attributes, last)) in expected {
            let item = store.get(&format!("i{}", id)).unwrap();
            prop_assert_eq!(&item.attributes, &attributes);
            prop_assert_eq!(item.last_updated, last);
        }
    }
}
