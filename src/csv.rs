//! CSV export of businesses and CSV import of contacts.

use chrono::{DateTime, Utc};

use crate::db::models::Business;
use crate::whatsapp::contacts::{Contact, ContactSource};

pub const CONTENT_TYPE: &str = "text/csv; charset=utf-8";

const BOM: char = '\u{FEFF}';
const HEADER: [&str; 8] = [
    "Name",
    "Address",
    "Phone",
    "Website",
    "Instagram",
    "WhatsApp",
    "Rating",
    "Opening Hours",
];

fn quote(value: Option<&str>) -> String {
    format!("\"{}\"", value.unwrap_or_default().replace('"', "\"\""))
}

/// Renders businesses with a BOM and `\n` line endings.
pub fn export_businesses(businesses: &[Business]) -> String {
    let mut out = String::new();
    out.push(BOM);
    out.push_str(&HEADER.join(","));

    for business in businesses {
        let rating = business
            .rating
            .filter(|r| *r != 0.0)
            .map(|r| r.to_string())
            .unwrap_or_default();
        let row = [
            quote(Some(&business.name)),
            quote(business.address.as_deref()),
            quote(business.phone.as_deref()),
            quote(business.website.as_deref()),
            quote(business.instagram.as_deref()),
            quote(business.whatsapp.as_deref()),
            rating,
            quote(business.opening_hours.as_deref()),
        ];
        out.push('\n');
        out.push_str(&row.join(","));
    }
    out
}

/// `{prefix}_{YYYY-MM-DD}.csv`, dated by the UTC day of `at`.
pub fn export_filename(prefix: &str, at: DateTime<Utc>) -> String {
    let prefix = prefix.trim();
    let prefix = if prefix.is_empty() { "companies" } else { prefix };
    let safe: String = prefix
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{safe}_{}.csv", at.date_naive().format("%Y-%m-%d"))
}

/// Splits one line on `delimiter`, honoring double-quoted fields.
fn split_line(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            c if c == delimiter && !in_quotes => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            c => current.push(c),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

fn is_header(fields: &[String]) -> bool {
    let first = fields.first().map(|f| f.to_lowercase()).unwrap_or_default();
    let second = fields.get(1).map(|f| f.to_lowercase()).unwrap_or_default();
    ["empresa", "nome", "name"].iter().any(|k| first.contains(k))
        || ["telefone", "phone"].iter().any(|k| second.contains(k))
}

/// Reads `name,phone` rows (`;` also accepted). Rows without a phone are skipped.
pub fn import_contacts(text: &str) -> Vec<Contact> {
    let rows: Vec<Vec<String>> = text
        .trim_start_matches(BOM)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let delimiter = if line.contains(';') { ';' } else { ',' };
            split_line(line, delimiter)
        })
        .collect();

    let skip = usize::from(rows.first().is_some_and(|first| is_header(first)));
    rows.into_iter()
        .skip(skip)
        .filter_map(|fields| {
            let phone = fields.get(1).filter(|p| !p.is_empty())?.clone();
            let name = fields
                .first()
                .filter(|n| !n.is_empty())
                .cloned()
                .unwrap_or_else(|| phone.clone());
            Some(Contact::new(name, phone, ContactSource::Csv))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_quotes_and_escapes() {
        let business = Business {
            name: "Bar \"do Zé\"".to_string(),
            address: Some("Rua 1, Centro".to_string()),
            rating: Some(4.5),
            opening_hours: Some("Open now".to_string()),
            ..Default::default()
        };
        let csv = export_businesses(&[business]);

        assert!(csv.starts_with('\u{FEFF}'));
        let lines: Vec<&str> = csv.trim_start_matches('\u{FEFF}').split('\n').collect();
        assert_eq!(
            lines[0],
            "Name,Address,Phone,Website,Instagram,WhatsApp,Rating,Opening Hours"
        );
        assert_eq!(
            lines[1],
            "\"Bar \"\"do Zé\"\"\",\"Rua 1, Centro\",\"\",\"\",\"\",\"\",4.5,\"Open now\""
        );
        assert!(!csv.contains('\r'));
    }

    #[test]
    fn test_export_missing_rating_is_empty() {
        let csv = export_businesses(&[Business::from_phone("A".to_string(), "1".to_string())]);
        assert!(csv.ends_with("\"A\",\"\",\"1\",\"\",\"\",\"\",,\"\""));
    }

    #[test]
    fn test_export_filename() {
        let at = "2024-03-09T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(export_filename("empresas", at), "empresas_2024-03-09.csv");
        assert_eq!(export_filename("Clínicas SP", at), "Clínicas_SP_2024-03-09.csv");
        assert_eq!(export_filename("", at), "companies_2024-03-09.csv");
    }

    #[test]
    fn test_export_filename_uses_utc_day() {
        // 21:30 in São Paulo is already the next day in UTC.
        let at = chrono::DateTime::parse_from_rfc3339("2024-03-09T21:30:00-03:00")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(export_filename("leads", at), "leads_2024-03-10.csv");
    }

    #[test]
    fn test_import_with_header_and_semicolons() {
        let text = "\u{FEFF}Empresa;Telefone\r\nPadaria Pão Bom;5511999990001\r\n\r\nSem fone;\n";
        let contacts = import_contacts(text);
        assert_eq!(
            contacts,
            vec![Contact::new("Padaria Pão Bom", "5511999990001", ContactSource::Csv)]
        );
    }

    #[test]
    fn test_import_without_header_and_quoted_commas() {
        let text = "\"Silva, Souza & Cia\",\"+55 11 3333-4444\"\nAcme,5511888880000";
        let contacts = import_contacts(text);
        assert_eq!(contacts.len(), 2);
        assert_eq!(contacts[0].name, "Silva, Souza & Cia");
        assert_eq!(contacts[0].phone, "+55 11 3333-4444");
        assert_eq!(contacts[1].name, "Acme");
    }

    #[test]
    fn test_import_header_detected_by_phone_column() {
        let contacts = import_contacts("Cliente,Phone number\nAna,123");
        assert_eq!(contacts, vec![Contact::new("Ana", "123", ContactSource::Csv)]);
    }

    #[test]
    fn test_split_line_doubled_quotes() {
        assert_eq!(
            split_line("\"He said \"\"hi\"\"\",2", ','),
            vec!["He said \"hi\"".to_string(), "2".to_string()]
        );
    }
}
