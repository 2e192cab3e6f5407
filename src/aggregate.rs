use std::collections::HashMap;

use serde::Serialize;

use crate::types::ProbeOutcome;

/// One row of the by-title view.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct TitleCount {
    pub title: String,
    pub count: u64,
}

/// One row of the by-content view: fingerprint, first-seen title, count.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ContentCount {
    pub fingerprint: String,
    pub title: String,
    pub count: u64,
}

/// Grouped views derived from a finished result store.
#[derive(Serialize, Debug, Clone, Default)]
pub struct Tables {
    pub titles: Vec<TitleCount>,
    pub content: Vec<ContentCount>,
}

/// Reduce finished records into both grouped views in a single pass.
///
/// Pure: no I/O, and the output depends only on the records and their
/// iteration order. Rows keep first-sight order; the first record seen for a
/// fingerprint pins that group's representative title. Failure records group
/// under their label in both views.
pub fn aggregate<'a, I>(records: I) -> Tables
where
    I: IntoIterator<Item = &'a ProbeOutcome>,
{
    let mut titles: Vec<TitleCount> = Vec::new();
    let mut title_index: HashMap<String, usize> = HashMap::new();
    let mut content: Vec<ContentCount> = Vec::new();
    let mut content_index: HashMap<String, usize> = HashMap::new();

    for record in records {
        let title = record.title_field();
        match title_index.get(&title) {
            Some(&i) => titles[i].count += 1,
            None => {
                title_index.insert(title.clone(), titles.len());
                titles.push(TitleCount { title, count: 1 });
            }
        }

        let fingerprint = record.hash_field();
        match content_index.get(&fingerprint) {
            Some(&i) => content[i].count += 1,
            None => {
                content_index.insert(fingerprint.clone(), content.len());
                content.push(ContentCount {
                    fingerprint,
                    title: record.title_field(),
                    count: 1,
                });
            }
        }
    }

    Tables { titles, content }
}
