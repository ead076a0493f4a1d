#![no_main]

use arbitrary::Arbitrary;
use hybridfind::query::{escape_sql, render_probe, render_query, QueryBuilder};
use libfuzzer_sys::fuzz_target;
use std::path::Path;

#[derive(Debug, Arbitrary)]
struct Input<'a> {
    root: &'a str,
    filename: Option<&'a str>,
    substring: Option<&'a str>,
    content: Option<&'a str>,
    recurse: bool,
}

fuzz_target!(|input: Input<'_>| {
    // Every quote must come out doubled, whatever the input
    let escaped = escape_sql(input.root);
    assert_eq!(escaped.matches('\'').count(), input.root.matches('\'').count() * 2);

    let root = format!("/{}", input.root);
    let _ = render_probe(Path::new(&root));

    let mut builder = QueryBuilder::new().root(&root).recurse(input.recurse);
    if let Some(name) = input.filename {
        builder = builder.filename(name);
    }
    if let Some(substring) = input.substring {
        builder = builder.substring(substring);
    }
    if let Some(text) = input.content {
        builder = builder.content_text(text);
    }
    // Invalid queries are rejected, never rendered
    if let Ok(query) = builder.build() {
        let _ = render_query(&query);
    }
});
