use crate::core::{Territory, TerritoryId};
use crate::import::{ImportError, ImportSummary, Skipped};
use crate::storage::TerritoryStore;
use encoding_rs::WINDOWS_1251;
use std::path::Path;
use tracing::{debug, info, warn};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameRecord {
    pub id: TerritoryId,
    pub custom_name: String,
}

/// Decodes UTF-8 (with or without BOM), falling back to Windows-1251 for
/// files saved by older spreadsheet software.
pub fn decode_csv(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            debug!("csv is not valid UTF-8, decoding as windows-1251");
            let (text, _) = WINDOWS_1251.decode_without_bom_handling(bytes);
            text.into_owned()
        }
    }
}

/// Parses `id` / `custom_name` rows. The delimiter (`;` or `,`) is taken
/// from the header. Rows that cannot be used are returned as skipped.
pub fn parse_names(text: &str) -> Result<(Vec<NameRecord>, Vec<Skipped>), ImportError> {
    let mut lines = text
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());

    let (_, header) = lines.next().ok_or(ImportError::EmptyFile)?;
    let delimiter = detect_delimiter(header);
    let columns: Vec<String> = split_record(header, delimiter)
        .into_iter()
        .map(|name| name.trim().to_ascii_lowercase())
        .collect();
    let id_column = column_index(&columns, "id")?;
    let name_column = column_index(&columns, "custom_name")?;

    let mut records = Vec::new();
    let mut skipped = Vec::new();
    for (index, line) in lines {
        let source = format!("line {}", index + 1);
        let fields = split_record(line, delimiter);
        let raw_id = fields.get(id_column).map(String::as_str).unwrap_or("");
        let name = fields
            .get(name_column)
            .map(|name| name.trim())
            .unwrap_or("");

        let id = match raw_id.parse::<TerritoryId>() {
            Ok(id) => id,
            Err(err) => {
                skipped.push(Skipped {
                    source,
                    reason: err.to_string(),
                });
                continue;
            }
        };
        if name.is_empty() {
            skipped.push(Skipped {
                source,
                reason: "empty custom_name".to_string(),
            });
            continue;
        }

        records.push(NameRecord {
            id,
            custom_name: name.to_string(),
        });
    }
    Ok((records, skipped))
}

/// Applies the names in one transaction. Existing territories keep their
/// status, holder, dates and notes; unknown ids are created free.
pub async fn import_names(
    store: &TerritoryStore,
    records: Vec<NameRecord>,
) -> Result<ImportSummary, ImportError> {
    let mut summary = ImportSummary::default();
    let mut tx = store.begin().await;

    for record in records {
        if tx.contains(record.id) {
            if tx.get_territory(record.id)?.custom_name == record.custom_name {
                summary.unchanged += 1;
                continue;
            }
            tx.update_territory(record.id, |territory| {
                territory.custom_name = record.custom_name
            })?;
            summary.updated += 1;
        } else {
            let mut territory = Territory::new(record.id);
            territory.custom_name = record.custom_name;
            tx.insert_territory(territory)?;
            summary.created += 1;
        }
    }

    tx.commit().await?;
    Ok(summary)
}

pub async fn import_names_file(
    store: &TerritoryStore,
    path: impl AsRef<Path>,
) -> Result<ImportSummary, ImportError> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ImportError::io(path, e))?;

    let (records, skipped) = parse_names(&decode_csv(&bytes))?;
    for row in &skipped {
        warn!(source = %row.source, reason = %row.reason, "csv row skipped");
    }

    let mut summary = import_names(store, records).await?;
    summary.skipped = skipped;
    info!(
        path = %path.display(),
        created = summary.created,
        updated = summary.updated,
        unchanged = summary.unchanged,
        skipped = summary.skipped.len(),
        "territory names imported"
    );
    Ok(summary)
}

fn detect_delimiter(header: &str) -> char {
    let semicolons = header.matches(';').count();
    let commas = header.matches(',').count();
    if semicolons >= commas && semicolons > 0 {
        ';'
    } else {
        ','
    }
}

fn column_index(columns: &[String], name: &'static str) -> Result<usize, ImportError> {
    columns
        .iter()
        .position(|column| column.trim_start_matches('\u{feff}') == name)
        .ok_or(ImportError::MissingColumn(name))
}

/// Splits one CSV line, honouring double-quoted fields and `""` escapes.
fn split_record(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            c if c == delimiter && !quoted => fields.push(std::mem::take(&mut field)),
            c => field.push(c),
        }
    }
    fields.push(field);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TerritoryStatus;
    use crate::core::dates::parse_date;

    fn id(value: u32) -> TerritoryId {
        TerritoryId::new(value).unwrap()
    }

    #[test]
    fn semicolon_file_with_legacy_ids() {
        let (records, skipped) =
            parse_names("id;custom_name\n1.0;Old Town\n\n2;\"Mill; Bridge\"\nx;Nowhere\n3;  \n")
                .unwrap();

        assert_eq!(
            records,
            vec![
                NameRecord {
                    id: id(1),
                    custom_name: "Old Town".to_string()
                },
                NameRecord {
                    id: id(2),
                    custom_name: "Mill; Bridge".to_string()
                },
            ]
        );
        assert_eq!(skipped.len(), 2);
        assert_eq!(skipped[0].source, "line 5");
    }

    #[test]
    fn comma_file_with_extra_columns() {
        let (records, _) =
            parse_names("notes,custom_name,id\n\"say \"\"hi\"\"\",Harbour,12\n").unwrap();
        assert_eq!(records[0].id, id(12));
        assert_eq!(records[0].custom_name, "Harbour");
    }

    #[test]
    fn missing_column_is_reported() {
        assert!(matches!(
            parse_names("id;name\n1;A\n"),
            Err(ImportError::MissingColumn("custom_name"))
        ));
        assert!(matches!(parse_names("\n\n"), Err(ImportError::EmptyFile)));
    }

    #[test]
    fn windows_1251_fallback() {
        let bytes = b"id;custom_name\n1;\xD6\xE5\xED\xF2\xF0\n";
        let (records, _) = parse_names(&decode_csv(bytes)).unwrap();
        assert_eq!(records[0].custom_name, "Центр");

        let with_bom = "\u{feff}id;custom_name\n4;Луг\n".as_bytes();
        let (records, _) = parse_names(&decode_csv(with_bom)).unwrap();
        assert_eq!(records[0].custom_name, "Луг");
    }

    #[tokio::test]
    async fn import_keeps_assignment_state() {
        let store = TerritoryStore::in_memory();
        store.seed(2).await.unwrap();
        {
            let mut tx = store.begin().await;
            tx.update_territory(id(1), |t| {
                t.status = TerritoryStatus::Assigned;
                t.assignee = "Ivy".to_string();
                t.date_taken = Some(parse_date("01.02.2025").unwrap());
                t.date_due = Some(parse_date("01.06.2025").unwrap());
                t.notes = "keep me".to_string();
            })
            .unwrap();
            tx.commit().await.unwrap();
        }

        let records = vec![
            NameRecord {
                id: id(1),
                custom_name: "Hillside".to_string(),
            },
            NameRecord {
                id: id(2),
                custom_name: "Territory 2".to_string(),
            },
            NameRecord {
                id: id(9),
                custom_name: "Quarry".to_string(),
            },
        ];
        let summary = import_names(&store, records).await.unwrap();
        assert_eq!((summary.created, summary.updated, summary.unchanged), (1, 1, 1));

        let first = store.get_territory(id(1)).await.unwrap();
        assert_eq!(first.custom_name, "Hillside");
        assert_eq!(first.assignee, "Ivy");
        assert_eq!(first.notes, "keep me");

        let created = store.get_territory(id(9)).await.unwrap();
        assert_eq!(created.custom_name, "Quarry");
        assert!(!created.is_assigned());
    }
}
