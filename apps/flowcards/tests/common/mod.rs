//! Common test utilities and fixtures for integration tests.
//!
//! Packages are built for real: a scratch SQLite snapshot with the
//! `col`/`cards`/`notes` tables, zipped in memory together with any media
//! entries, exactly the shape the decoder consumes.

#![allow(dead_code)]

pub mod fixtures;

use std::collections::HashMap;
use std::io::Write;

use rusqlite::{params, Connection};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// One card row destined for the snapshot fixture.
pub struct PackageCard {
    pub id: i64,
    pub note_id: i64,
    pub fields: Vec<String>,
}

impl PackageCard {
    pub fn new(id: i64, fields: &[&str]) -> Self {
        Self {
            id,
            note_id: id,
            fields: fields.iter().map(|field| field.to_string()).collect(),
        }
    }
}

/// One deck destined for the snapshot fixture.
pub struct PackageDeck {
    pub id: i64,
    pub name: String,
    pub cards: Vec<PackageCard>,
}

impl PackageDeck {
    pub fn new(id: i64, name: &str, cards: Vec<PackageCard>) -> Self {
        Self {
            id,
            name: name.to_string(),
            cards,
        }
    }
}

/// Builds a complete card package: relational snapshot plus media entries.
pub fn build_package(decks: &[PackageDeck], media: &[(&str, &[u8])]) -> Vec<u8> {
    zip_package(&snapshot_bytes(decks), media)
}

/// Builds just the relational snapshot file for the given decks.
pub fn snapshot_bytes(decks: &[PackageDeck]) -> Vec<u8> {
    let scratch = tempfile::tempdir().expect("scratch dir");
    let snapshot_path = scratch.path().join("collection.anki2");
    {
        let conn = Connection::open(&snapshot_path).expect("snapshot database");
        conn.execute_batch(
            "CREATE TABLE col (id INTEGER PRIMARY KEY, decks TEXT NOT NULL);
             CREATE TABLE cards (id INTEGER PRIMARY KEY, nid INTEGER NOT NULL, did INTEGER NOT NULL, ord INTEGER NOT NULL DEFAULT 0);
             CREATE TABLE notes (id INTEGER PRIMARY KEY, flds TEXT NOT NULL);",
        )
        .expect("snapshot schema");

        let deck_definitions: serde_json::Map<String, serde_json::Value> = decks
            .iter()
            .map(|deck| {
                (
                    deck.id.to_string(),
                    serde_json::json!({ "name": deck.name }),
                )
            })
            .collect();
        conn.execute(
            "INSERT INTO col (id, decks) VALUES (1, ?1)",
            params![serde_json::Value::Object(deck_definitions).to_string()],
        )
        .expect("deck definitions");

        for deck in decks {
            for card in &deck.cards {
                conn.execute(
                    "INSERT INTO notes (id, flds) VALUES (?1, ?2)",
                    params![card.note_id, card.fields.join("\u{1f}")],
                )
                .expect("note row");
                conn.execute(
                    "INSERT INTO cards (id, nid, did, ord) VALUES (?1, ?2, ?3, 0)",
                    params![card.id, card.note_id, deck.id],
                )
                .expect("card row");
            }
        }
    }
    std::fs::read(&snapshot_path).expect("read snapshot")
}

/// Zips arbitrary snapshot bytes with media entries. Useful for invalid
/// packages too (e.g. a snapshot that is not a database).
pub fn zip_package(snapshot_bytes: &[u8], media: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    writer
        .start_file("collection.anki2", options)
        .expect("start snapshot entry");
    writer.write_all(snapshot_bytes).expect("write snapshot");

    if !media.is_empty() {
        let manifest: HashMap<String, String> = media
            .iter()
            .enumerate()
            .map(|(index, (name, _))| (index.to_string(), name.to_string()))
            .collect();
        writer.start_file("media", options).expect("start manifest");
        writer
            .write_all(serde_json::to_string(&manifest).expect("manifest json").as_bytes())
            .expect("write manifest");
        for (index, (_, blob)) in media.iter().enumerate() {
            writer
                .start_file(index.to_string(), options)
                .expect("start media entry");
            writer.write_all(blob).expect("write media blob");
        }
    }

    writer
        .finish()
        .expect("finish package")
        .into_inner()
}

/// Zips a snapshot together with a raw (possibly malformed) media manifest.
pub fn package_with_raw_manifest(snapshot_bytes: &[u8], manifest: &[u8]) -> Vec<u8> {
    let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    writer
        .start_file("collection.anki2", options)
        .expect("start snapshot entry");
    writer.write_all(snapshot_bytes).expect("write snapshot");
    writer.start_file("media", options).expect("start manifest");
    writer.write_all(manifest).expect("write manifest");
    writer.finish().expect("finish package").into_inner()
}

/// A zip that contains no usable entries at all.
pub fn empty_package() -> Vec<u8> {
    let writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    writer.finish().expect("finish package").into_inner()
}
