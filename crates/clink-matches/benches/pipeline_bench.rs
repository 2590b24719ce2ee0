//! Match-pipeline hot path: `reset -> generate -> fill_info -> select ->
//! sort` over a generator producing a few thousand candidates, the shape
//! the kernel drives on every keystroke that changes the end-word.

use clink_matches::{ComparePolicy, MatchBuilder, MatchGenerator, MatchPipeline, RawMatch};
use criterion::{Criterion, black_box, criterion_group, criterion_main};

struct WordListGenerator {
    words: Vec<String>,
}

impl MatchGenerator for WordListGenerator {
    fn generate(&mut self, _line: &str, builder: &mut MatchBuilder) -> bool {
        for word in &self.words {
            if !builder.add_match(RawMatch::new(word.clone())) {
                break;
            }
        }
        true
    }

    fn get_prefix_length(&mut self, _line: &str) -> u32 {
        0
    }
}

fn word_list(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("candidate-entry-{i:05}")).collect()
}

fn bench_pipeline(c: &mut Criterion) {
    let words = word_list(2000);
    c.bench_function("match_pipeline_full_run", |b| {
        b.iter(|| {
            let mut pipeline = MatchPipeline::new();
            let mut generators: Vec<Box<dyn MatchGenerator>> = vec![Box::new(WordListGenerator {
                words: words.clone(),
            })];
            pipeline.reset();
            pipeline.generate(black_box("candidate-entry-001"), &mut generators);
            pipeline.fill_info();
            pipeline.select("candidate-entry-001", ComparePolicy::Relaxed);
            pipeline.coalesce();
            pipeline.sort();
            black_box(pipeline.selected_count());
        });
    });
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
