//! Search over a source: filtering, optional sampling, pagination into
//! bounded-size chunks.
//!
//! Results stream as lazy chunks so a large corpus never needs O(corpus)
//! memory on the response path; only the shuffled index plus one chunk is
//! held at a time.

use std::sync::Arc;

use rand::seq::SliceRandom;

use crate::{corpus::Source, record::Record};

/// Matches per flushed chunk, sized for the downstream message ceiling.
pub const CHUNK_SIZE: usize = 20;

#[derive(Clone, Debug)]
pub struct QueryOptions {
    /// Cut the stream short after this many matches; the partial final
    /// chunk is still emitted.
    pub max_results: Option<usize>,
    /// Read lines in randomized order before truncation, so a capped query
    /// does not always return the same prefix of the file.
    pub shuffle: bool,
    /// Raw-mode output (unsubstituted `identity:secret` pairs).
    pub raw_mode: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            max_results: None,
            shuffle: true,
            raw_mode: false,
        }
    }
}

/// Up to [`CHUNK_SIZE`] matches, flushed as one outgoing message.
#[derive(Clone, Debug)]
pub struct Chunk {
    pub matches: Vec<Record>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Render the chunk body: raw pairs in raw mode, labelled
    /// username/password lines otherwise.
    pub fn render(&self, raw_mode: bool) -> String {
        if raw_mode {
            self.matches
                .iter()
                .map(|r| r.raw_pair())
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            self.matches
                .iter()
                .map(|r| {
                    format!(
                        "\nUsername: {}\nPassword: {}",
                        r.display_identity(),
                        r.display_secret()
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
    }
}

/// Search result: an explicit no-match signal, distinct from an empty chunk
/// stream, so the caller can post one "not found" reply instead of nothing.
pub enum SearchOutcome {
    NoMatches,
    Found(ChunkStream),
}

/// Lazy chunk producer over one source snapshot.
pub struct ChunkStream {
    source: Arc<Source>,
    order: Vec<usize>,
    pos: usize,
    remaining: Option<usize>,
    query: String,
    raw_mode: bool,
    buffered: Option<Record>,
    matched: usize,
}

impl ChunkStream {
    pub fn raw_mode(&self) -> bool {
        self.raw_mode
    }

    /// Matches yielded so far (including any buffered first match).
    pub fn matched_so_far(&self) -> usize {
        self.matched
    }

    fn next_match(&mut self) -> Option<Record> {
        if self.remaining == Some(0) {
            return None;
        }
        while self.pos < self.order.len() {
            let idx = self.order[self.pos];
            self.pos += 1;

            let Some(rec) = Record::parse(&self.source.lines[idx]) else {
                continue;
            };
            if !rec.identity.contains(&self.query) {
                continue;
            }

            if let Some(rem) = self.remaining.as_mut() {
                *rem -= 1;
            }
            self.matched += 1;
            return Some(rec);
        }
        None
    }
}

impl Iterator for ChunkStream {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let mut matches = Vec::with_capacity(CHUNK_SIZE);
        if let Some(first) = self.buffered.take() {
            matches.push(first);
        }
        while matches.len() < CHUNK_SIZE {
            match self.next_match() {
                Some(rec) => matches.push(rec),
                None => break,
            }
        }

        if matches.is_empty() {
            None
        } else {
            Some(Chunk { matches })
        }
    }
}

/// Run a search over a source snapshot.
///
/// The predicate is a case-sensitive substring match against the
/// post-heuristic identity field only, not the whole line.
pub fn search(source: Arc<Source>, query: &str, options: QueryOptions) -> SearchOutcome {
    let mut order: Vec<usize> = (0..source.lines.len()).collect();
    if options.shuffle {
        order.shuffle(&mut rand::rng());
    }

    let mut stream = ChunkStream {
        source,
        order,
        pos: 0,
        remaining: options.max_results,
        query: query.to_string(),
        raw_mode: options.raw_mode,
        buffered: None,
        matched: 0,
    };

    // Scan for the first match up front so "nothing matched" is an explicit
    // outcome instead of an empty stream.
    match stream.next_match() {
        Some(rec) => {
            stream.buffered = Some(rec);
            SearchOutcome::Found(stream)
        }
        None => SearchOutcome::NoMatches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::path::PathBuf;

    fn source_with(lines: Vec<String>) -> Arc<Source> {
        Arc::new(Source {
            name: "test".to_string(),
            path: PathBuf::from("/tmp/test.txt"),
            lines,
        })
    }

    fn matching_lines(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("user{i}:pass{i}:extra")).collect()
    }

    #[test]
    fn forty_five_matches_paginate_as_20_20_5() {
        let mut lines = matching_lines(45);
        lines.push("short:line".to_string()); // rejected by the parser
        lines.push("other:pw:x".to_string()); // parsed but not matching

        let outcome = search(
            source_with(lines),
            "user",
            QueryOptions {
                shuffle: false,
                ..QueryOptions::default()
            },
        );
        let SearchOutcome::Found(stream) = outcome else {
            panic!("expected matches");
        };

        let sizes: Vec<usize> = stream.map(|c| c.len()).collect();
        assert_eq!(sizes, vec![20, 20, 5]);
    }

    #[test]
    fn no_matching_records_is_an_explicit_outcome() {
        let outcome = search(
            source_with(matching_lines(10)),
            "netflix",
            QueryOptions::default(),
        );
        assert!(matches!(outcome, SearchOutcome::NoMatches));
    }

    #[test]
    fn max_results_cuts_mid_chunk_and_emits_the_partial() {
        let outcome = search(
            source_with(matching_lines(100)),
            "user",
            QueryOptions {
                max_results: Some(25),
                shuffle: false,
                raw_mode: false,
            },
        );
        let SearchOutcome::Found(stream) = outcome else {
            panic!("expected matches");
        };

        let sizes: Vec<usize> = stream.map(|c| c.len()).collect();
        assert_eq!(sizes, vec![20, 5]);
    }

    #[test]
    fn shuffle_then_truncate_returns_distinct_members_of_the_match_set() {
        let lines = matching_lines(1000);
        let full: HashSet<String> = lines.clone().into_iter().collect();

        let outcome = search(
            source_with(lines),
            "user",
            QueryOptions {
                max_results: Some(5),
                shuffle: true,
                raw_mode: false,
            },
        );
        let SearchOutcome::Found(stream) = outcome else {
            panic!("expected matches");
        };

        let got: Vec<Record> = stream.flat_map(|c| c.matches).collect();
        assert_eq!(got.len(), 5);

        let raws: HashSet<String> = got.iter().map(|r| r.raw.clone()).collect();
        assert_eq!(raws.len(), 5, "returned records must be distinct");
        for raw in &raws {
            assert!(full.contains(raw), "record must come from the source");
        }
    }

    #[test]
    fn predicate_scans_identity_not_the_whole_line() {
        // The query appears in the secret column only; identity must not match.
        let outcome = search(
            source_with(vec!["login:netflix:x".to_string()]),
            "netflix",
            QueryOptions {
                shuffle: false,
                ..QueryOptions::default()
            },
        );
        assert!(matches!(outcome, SearchOutcome::NoMatches));
    }

    #[test]
    fn raw_and_display_rendering_differ() {
        let chunk = Chunk {
            matches: vec![Record::parse("http:site::pw").unwrap()],
        };
        assert_eq!(chunk.render(true), ":pw");
        let display = chunk.render(false);
        assert!(display.contains("index has no username"));
        assert!(display.contains("Password: pw"));
    }
}
