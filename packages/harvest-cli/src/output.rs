//! CSV output for run results.

use anyhow::Result;
use feed_harvest::{AcceptedRecord, ProfileRecord, StructuredFields};
use std::io;

const STRUCTURED_COLUMNS: [&str; 8] = [
    "location",
    "about",
    "experience",
    "education",
    "skills",
    "certifications",
    "languages",
    "source",
];

/// Column layout of an entity export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Add `designation_score` (rosters)
    pub designation: bool,
    /// Add the normalized columns
    pub structured: bool,
}

impl Layout {
    fn header(&self) -> Vec<&'static str> {
        let mut header = vec!["name", "headline", "profile_url", "identity_key"];
        if self.designation {
            header.push("designation_score");
        }
        if self.structured {
            header.extend(STRUCTURED_COLUMNS);
        }
        header
    }
}

/// Write accepted records in admission order.
pub fn write_entities<W: io::Write>(
    writer: W,
    records: &[AcceptedRecord],
    layout: Layout,
) -> Result<()> {
    let mut csv_writer = csv::WriterBuilder::new().from_writer(writer);
    csv_writer.write_record(layout.header())?;

    for record in records {
        let mut row = vec![
            record.display_name.clone().unwrap_or_default(),
            record.headline.clone().unwrap_or_default(),
            record.profile_url.clone().unwrap_or_default(),
            record.identity_key().to_string(),
        ];
        if layout.designation {
            row.push(record.designation_score().to_string());
        }
        if layout.structured {
            match &record.structured {
                Some(fields) => row.extend(structured_cells(fields)),
                None => row.extend(vec![String::new(); STRUCTURED_COLUMNS.len()]),
            }
        }
        csv_writer.write_record(&row)?;
    }

    csv_writer.flush()?;
    Ok(())
}

/// Write one profile as a single row.
pub fn write_profile<W: io::Write>(writer: W, profile: &ProfileRecord) -> Result<()> {
    let mut csv_writer = csv::WriterBuilder::new().from_writer(writer);

    let mut header = vec!["profile_url", "name", "headline"];
    header.extend(STRUCTURED_COLUMNS);
    csv_writer.write_record(&header)?;

    let fields = &profile.fields;
    let mut row = vec![
        profile.profile_url.clone(),
        fields.name.clone(),
        fields.headline.clone(),
    ];
    row.extend(structured_cells(fields));
    csv_writer.write_record(&row)?;

    csv_writer.flush()?;
    Ok(())
}

fn structured_cells(fields: &StructuredFields) -> Vec<String> {
    vec![
        fields.location.clone(),
        fields.about.clone(),
        fields.experience.clone(),
        fields.education.clone(),
        fields.skills.clone(),
        fields.certifications.clone(),
        fields.languages.clone(),
        if fields.is_fallback() { "fallback" } else { "inference" }.to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use feed_harvest::FieldSource;

    #[test]
    fn test_profile_row() {
        let profile = ProfileRecord {
            profile_url: "https://www.linkedin.com/in/ada/".to_string(),
            fields: StructuredFields {
                name: "Ada Lovelace".to_string(),
                headline: "Analyst, Engine Co".to_string(),
                ..StructuredFields::empty(FieldSource::Inference)
            },
            cleaned_text: String::new(),
        };

        let mut out = Vec::new();
        write_profile(&mut out, &profile).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();

        assert_eq!(
            lines.next().unwrap(),
            "profile_url,name,headline,location,about,experience,education,skills,certifications,languages,source"
        );
        assert_eq!(
            lines.next().unwrap(),
            "https://www.linkedin.com/in/ada/,Ada Lovelace,\"Analyst, Engine Co\",,,,,,,,inference"
        );
    }

    #[test]
    fn test_entity_header_layouts() {
        let plain = Layout {
            designation: false,
            structured: false,
        };
        assert_eq!(plain.header().len(), 4);

        let roster = Layout {
            designation: true,
            structured: true,
        };
        let header = roster.header();
        assert_eq!(header[4], "designation_score");
        assert_eq!(header.len(), 13);
    }

    #[test]
    fn test_empty_export_has_header_only() {
        let mut out = Vec::new();
        write_entities(
            &mut out,
            &[],
            Layout {
                designation: true,
                structured: false,
            },
        )
        .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "name,headline,profile_url,identity_key,designation_score\n"
        );
    }
}
