use std::collections::HashSet;

use crate::types::{Envelope, FlatRecord, MISSING_IMAGE};

/// Expand an envelope into one record per (article, category) pair.
///
/// Scalar article fields are copied unchanged into every expanded record.
/// An article with no categories yields nothing and drops out of the
/// stream here.
pub fn flatten(envelope: Envelope) -> impl Iterator<Item = FlatRecord> {
    envelope.news.into_iter().flat_map(|article| {
        let categories = article.category.clone();
        categories.into_iter().map(move |category| FlatRecord {
            id: article.id.clone(),
            title: article.title.clone(),
            description: article.description.clone(),
            url: article.url.clone(),
            author: article.author.clone(),
            image: article.image.clone(),
            language: article.language.clone(),
            category,
            published: article.published,
        })
    })
}

/// Default-value policy for nullable fields: a missing image becomes the
/// literal `"None"` sentinel, everything else passes through untouched.
pub fn normalize(mut record: FlatRecord) -> FlatRecord {
    if record.image.is_none() {
        record.image = Some(MISSING_IMAGE.to_string());
    }
    record
}

/// Drop duplicate (id, category) records within one batch, keeping the first
/// in arrival order. Returns the number of records removed.
///
/// Batch-local only: the same key arriving in a later batch is not caught
/// here, the merge step's per-key overwrite resolves it instead.
pub fn dedupe(records: &mut Vec<FlatRecord>) -> usize {
    let before = records.len();
    let mut seen = HashSet::with_capacity(before);
    records.retain(|record| seen.insert((record.id.clone(), record.category.clone())));
    before - records.len()
}
