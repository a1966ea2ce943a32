//! Parcel detail page parser
//!
//! 상세 페이지는 `<th>라벨</th>` 다음 `<td>값</td>` 형태의 표로 구성됩니다.
//! 표의 셀을 문서 순서대로 평탄화한 뒤 라벨 기준으로 값을 찾습니다.

#![allow(clippy::uninlined_format_args)]

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use thiserror::Error;
use tracing::debug;

use crate::domain::ParcelRecord;

pub type ParsingResult<T> = Result<T, ParsingError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParsingError {
    #[error("Invalid CSS selector: {selector} - {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Invalid pattern: {pattern} - {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Page has no detail table ({content_length} bytes)")]
    MissingDetailTable { content_length: usize },
}

// 페이지 라벨
const LABEL_DENOMINATION: &str = "Denominação";
const LABEL_AREA: &str = "Área";
const LABEL_DATE_OF_ENTRY: &str = "Data de Entrada";
const LABEL_SITUATION: &str = "Situação";
const LABEL_TECHNICAL_MANAGER: &str = "Responsável Técnico(a)";
const LABEL_RT_DOCUMENT: &str = "Documento de RT";
const LABEL_PROPERTY_TYPE: &str = "Natureza";
const LABEL_CODE_INCRA: &str = "Código do Imóvel (SNCR/INCRA)";
const LABEL_CITY: &str = "Municípios";
const LABEL_OWNER_NAME: &str = "Nome";
const LABEL_REGISTRY_OFFICE: &str = "Cartório";
const LABEL_CNS: &str = "Código Nacional de Serventia (CNS)";
const LABEL_REGISTRATION: &str = "Matrícula";
const LABEL_REGISTRATION_SITUATION: &str = "Situação do Registro";

pub const REGISTRATION_CONFIRMED: &str = "Confirmado";
pub const REGISTRATION_NOT_CONFIRMED: &str = "Não confirmado";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellKind {
    Header,
    Data,
}

#[derive(Debug, Clone)]
struct Cell {
    kind: CellKind,
    /// whitespace-collapsed text
    text: String,
    /// text split at `<br>`
    lines: Vec<String>,
}

impl Cell {
    fn has_line_break(&self) -> bool {
        self.lines.len() > 1
    }
}

/// Flattened table cells in document order
struct DetailTable {
    cells: Vec<Cell>,
}

impl DetailTable {
    /// Index of the `occurrence`-th header cell whose text equals `label`
    fn header_index(&self, label: &str, occurrence: usize) -> Option<usize> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.kind == CellKind::Header && cell.text == label)
            .map(|(index, _)| index)
            .nth(occurrence)
    }

    /// First data cell after position `from`
    fn data_after(&self, from: usize) -> Option<(usize, &Cell)> {
        self.cells
            .iter()
            .enumerate()
            .skip(from + 1)
            .find(|(_, cell)| cell.kind == CellKind::Data)
    }

    fn value_cell(&self, label: &str, occurrence: usize) -> Option<(usize, &Cell)> {
        self.header_index(label, occurrence).and_then(|index| self.data_after(index))
    }

    fn value(&self, label: &str) -> String {
        self.value_cell(label, 0).map(|(_, cell)| cell.text.clone()).unwrap_or_default()
    }
}

/// Extracts a `ParcelRecord` from a parcel detail page
#[derive(Debug, Clone)]
pub struct ParcelDetailParser {
    cell_selector: Selector,
    whitespace: Regex,
    max_text_field_chars: usize,
}

impl ParcelDetailParser {
    /// # Arguments
    /// * `max_text_field_chars` - owner name and denomination are cut to this many characters
    pub fn new(max_text_field_chars: usize) -> ParsingResult<Self> {
        let selector = "th, td";
        let cell_selector = Selector::parse(selector).map_err(|e| ParsingError::InvalidSelector {
            selector: selector.to_string(),
            reason: e.to_string(),
        })?;
        let pattern = r"\s+";
        let whitespace = Regex::new(pattern).map_err(|e| ParsingError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            cell_selector,
            whitespace,
            max_text_field_chars,
        })
    }

    /// Parse the detail page for `parcel_code`. Labels absent from the page yield empty fields.
    pub fn parse(&self, parcel_code: &str, html: &str) -> ParsingResult<ParcelRecord> {
        let document = Html::parse_document(html);
        let table = self.flatten(&document);
        if !table.cells.iter().any(|cell| cell.kind == CellKind::Header) {
            return Err(ParsingError::MissingDetailTable {
                content_length: html.len(),
            });
        }
        debug!("🔎 {} table cells for parcel {}", table.cells.len(), parcel_code);

        let mut record = ParcelRecord::with_code(parcel_code);

        record.denomination = self.truncate(&table.value(LABEL_DENOMINATION));
        record.area = cut_before(&table.value(LABEL_AREA), "ha");
        record.date_of_entry = table.value(LABEL_DATE_OF_ENTRY);
        record.situation_parcel = table
            .value_cell(LABEL_SITUATION, 0)
            .and_then(|(_, cell)| cell.lines.first().cloned())
            .unwrap_or_default();
        record.technical_manager = table.value(LABEL_TECHNICAL_MANAGER);
        record.rt_document = cut_before(&table.value(LABEL_RT_DOCUMENT), " - ");
        record.situation_area = table
            .value_cell(LABEL_SITUATION, 1)
            .map(|(_, cell)| cell.text.clone())
            .unwrap_or_default();
        record.property_type = table.value(LABEL_PROPERTY_TYPE);
        record.code_incra = table.value(LABEL_CODE_INCRA);
        record.city_uf = table.value(LABEL_CITY);

        if let Some((owner_index, owner_cell)) = table.value_cell(LABEL_OWNER_NAME, 0) {
            record.owner_name = self.truncate(&owner_cell.text);
            record.owner_cpf_or_cnpj = table
                .data_after(owner_index)
                .map(|(_, cell)| cell.text.clone())
                .unwrap_or_default();
        }

        record.registry_office = table.value(LABEL_REGISTRY_OFFICE);
        record.cns = table.value(LABEL_CNS);
        record.registration = table.value(LABEL_REGISTRATION);
        record.registration_situation = match table.value_cell(LABEL_REGISTRATION_SITUATION, 0) {
            Some((_, cell)) if cell.has_line_break() => REGISTRATION_CONFIRMED,
            _ => REGISTRATION_NOT_CONFIRMED,
        }
        .to_string();

        Ok(record)
    }

    fn flatten(&self, document: &Html) -> DetailTable {
        let cells = document
            .select(&self.cell_selector)
            .map(|element| {
                let kind = if element.value().name() == "th" {
                    CellKind::Header
                } else {
                    CellKind::Data
                };
                let lines = self.split_lines(element);
                let text = self.collapse(&element.text().collect::<String>());
                Cell { kind, text, lines }
            })
            .collect();
        DetailTable { cells }
    }

    /// Cell text split at `<br>` elements, each segment collapsed
    fn split_lines(&self, element: ElementRef<'_>) -> Vec<String> {
        let mut segments = vec![String::new()];
        for node in element.descendants() {
            match node.value() {
                Node::Text(text) => {
                    if let Some(current) = segments.last_mut() {
                        current.push_str(text);
                    }
                }
                Node::Element(inner) if inner.name() == "br" => segments.push(String::new()),
                _ => {}
            }
        }
        segments.iter().map(|segment| self.collapse(segment)).collect()
    }

    fn collapse(&self, text: &str) -> String {
        self.whitespace.replace_all(text, " ").trim().to_string()
    }

    fn truncate(&self, text: &str) -> String {
        text.chars().take(self.max_text_field_chars).collect()
    }
}

fn cut_before(text: &str, marker: &str) -> String {
    text.split(marker).next().unwrap_or_default().trim().to_string()
}
