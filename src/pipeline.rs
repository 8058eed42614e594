use std::sync::Arc;

use crate::{
    document::{Document, Node, keys},
    normalize::TextNormalizer,
    record::ReviewRecordParser,
};

/// One ingestion stage: takes a batch of nodes and returns the next batch.
///
/// Stages drop nodes they cannot handle instead of failing the batch.
pub trait Transform: Send + Sync {
    fn name(&self) -> &'static str;

    fn transform(&self, batch: Vec<Node>) -> Vec<Node>;
}

/// Splits document nodes into one node per raw review block.
#[derive(Debug, Clone, Default)]
pub struct SplitRecords {
    parser: ReviewRecordParser,
}

impl SplitRecords {
    pub fn new(parser: ReviewRecordParser) -> Self {
        Self { parser }
    }
}

impl Transform for SplitRecords {
    fn name(&self) -> &'static str {
        "split_records"
    }

    fn transform(&self, batch: Vec<Node>) -> Vec<Node> {
        batch
            .into_iter()
            .flat_map(|node| {
                self.parser
                    .split(&node.text)
                    .into_iter()
                    .map(|block| Node {
                        ref_doc_id: node.ref_doc_id.clone(),
                        text: block.to_string(),
                        metadata: node.metadata.clone(),
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

/// Parses each block into a review, keeping the original fields as
/// metadata. Blocks without a review body are dropped.
#[derive(Debug, Clone, Default)]
pub struct ParseRecords {
    parser: ReviewRecordParser,
}

impl ParseRecords {
    pub fn new(parser: ReviewRecordParser) -> Self {
        Self { parser }
    }
}

impl Transform for ParseRecords {
    fn name(&self) -> &'static str {
        "parse_records"
    }

    fn transform(&self, batch: Vec<Node>) -> Vec<Node> {
        batch
            .into_iter()
            .filter_map(|mut node| {
                let Some(record) = self.parser.parse(&node.text) else {
                    tracing::debug!(document = %node.ref_doc_id, "skipping empty block");
                    return None;
                };
                if !record.is_indexable() {
                    tracing::debug!(
                        document = %node.ref_doc_id,
                        name = %record.name,
                        "skipping review without text"
                    );
                    return None;
                }

                node.text = record.combined_text();
                node.metadata.insert(keys::NAME.to_string(), record.name);
                node.metadata
                    .insert(keys::CATEGORY.to_string(), record.category);
                node.metadata
                    .insert(keys::REVIEW_TEXT.to_string(), record.body_text);
                Some(node)
            })
            .collect()
    }
}

/// Replaces node text with its normalized tokens joined by single spaces.
#[derive(Debug, Clone)]
pub struct NormalizeText {
    normalizer: Arc<TextNormalizer>,
}

impl NormalizeText {
    pub fn new(normalizer: Arc<TextNormalizer>) -> Self {
        Self { normalizer }
    }
}

impl Transform for NormalizeText {
    fn name(&self) -> &'static str {
        "normalize_text"
    }

    fn transform(&self, batch: Vec<Node>) -> Vec<Node> {
        batch
            .into_iter()
            .filter_map(|mut node| {
                let normalized = self.normalizer.normalize_joined(&node.text);
                if normalized.is_empty() {
                    tracing::debug!(
                        document = %node.ref_doc_id,
                        "skipping block with no tokens left after normalization"
                    );
                    return None;
                }
                let original = std::mem::replace(&mut node.text, normalized);
                node.metadata
                    .insert(keys::ORIGINAL_TEXT.to_string(), original);
                Some(node)
            })
            .collect()
    }
}

/// Stages applied in order to a batch of documents.
pub struct Pipeline {
    stages: Vec<Box<dyn Transform>>,
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn Transform>>) -> Self {
        Self { stages }
    }

    /// split → parse → normalize.
    pub fn reviews(
        parser: ReviewRecordParser,
        normalizer: Arc<TextNormalizer>,
    ) -> Self {
        Self::new(vec![
            Box::new(SplitRecords::new(parser.clone())),
            Box::new(ParseRecords::new(parser)),
            Box::new(NormalizeText::new(normalizer)),
        ])
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn run(&self, documents: &[Document]) -> Vec<Node> {
        let batch: Vec<Node> = documents.iter().map(Node::from).collect();
        self.stages.iter().fold(batch, |batch, stage| {
            let before = batch.len();
            let out = stage.transform(batch);
            tracing::debug!(
                stage = stage.name(),
                input = before,
                output = out.len(),
                "pipeline stage finished"
            );
            out
        })
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}
