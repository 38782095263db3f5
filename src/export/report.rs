//! PDF inspection report
//!
//! Renders a finished session with genpdf: a title and date header, an info
//! block, one group of table rows per category with the captured images, and
//! footer lines. Landscape A4.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use genpdf::elements::{Break, FrameCellDecorator, Image, LinearLayout, Paragraph, TableLayout};
use genpdf::fonts::{FontData, FontFamily};
use genpdf::style::Style;
use genpdf::{Alignment, Document, Element, Margins, Scale, SimplePageDecorator, Size};
use tracing::{info, warn};

use crate::config::ReportConfig;
use crate::session::{Category, Layout, SessionSnapshot};
use crate::storage::sanitize_identifier;

/// Font sizes for PDF output (in points).
const TITLE_SIZE: u8 = 18;
const INFO_SIZE: u8 = 10;
const TABLE_SIZE: u8 = 8;
const FOOTER_SIZE: u8 = 9;

/// Landscape A4 in mm.
const PAGE_WIDTH_MM: f64 = 297.0;
const PAGE_HEIGHT_MM: f64 = 210.0;

/// Page margins in mm.
const MARGIN_MM: f64 = 5.0;
const CELL_PADDING_MM: f64 = 1.0;

/// Resolution genpdf assumes for embedded images
const IMAGE_DPI: f64 = 300.0;
const MM_PER_INCH: f64 = 25.4;

/// Relative column widths
const TEXT_WEIGHT: usize = 3;
const IMAGE_WEIGHT: usize = 3;
const RESULT_WEIGHT: usize = 2;

/// Operator-supplied details printed on the report
#[derive(Debug, Clone)]
pub(crate) struct ReportMetadata {
    pub inspector: String,
    pub model: String,
    pub generated_at: DateTime<Local>,
}

/// Produces a document for a finished session
pub(crate) trait ReportGenerator: Send + Sync {
    fn generate(&self, session: &SessionSnapshot, metadata: &ReportMetadata) -> Result<PathBuf>;
}

/// `{identifier}_Report.pdf`
pub(crate) fn report_file_name(identifier: &str) -> String {
    format!("{}_Report.pdf", sanitize_identifier(identifier))
}

/// Point numbers laid out `per_row` to a table row
fn point_rows(points: u32, per_row: u32) -> Vec<Vec<u32>> {
    let per_row = per_row.max(1) as usize;
    (1..=points)
        .collect::<Vec<_>>()
        .chunks(per_row)
        .map(|chunk| chunk.to_vec())
        .collect()
}

/// Scale factor that makes an image `pixel_width` wide fill `target_mm`
fn image_scale(pixel_width: u32, target_mm: f64) -> f64 {
    if pixel_width == 0 {
        return 1.0;
    }
    let natural_mm = pixel_width as f64 / IMAGE_DPI * MM_PER_INCH;
    target_mm / natural_mm
}

/// One set of font files to try
#[derive(Debug, Clone)]
struct FontCandidate {
    dir: PathBuf,
    regular: String,
    bold: String,
    italic: String,
    bold_italic: String,
}

impl FontCandidate {
    /// `{name}-Regular.ttf` naming used by most open font packages
    fn named(dir: impl Into<PathBuf>, name: &str) -> Self {
        Self {
            dir: dir.into(),
            regular: format!("{}-Regular.ttf", name),
            bold: format!("{}-Bold.ttf", name),
            italic: format!("{}-Italic.ttf", name),
            bold_italic: format!("{}-BoldItalic.ttf", name),
        }
    }

    fn explicit(dir: &str, files: [&str; 4]) -> Self {
        Self {
            dir: PathBuf::from(dir),
            regular: files[0].to_string(),
            bold: files[1].to_string(),
            italic: files[2].to_string(),
            bold_italic: files[3].to_string(),
        }
    }
}

fn load_font(path: &Path) -> Result<FontData> {
    FontData::new(
        std::fs::read(path).with_context(|| format!("Failed to read font: {}", path.display()))?,
        None,
    )
    .with_context(|| format!("Failed to parse font: {}", path.display()))
}

fn load_candidate(candidate: &FontCandidate) -> Result<FontFamily<FontData>> {
    Ok(FontFamily {
        regular: load_font(&candidate.dir.join(&candidate.regular))?,
        bold: load_font(&candidate.dir.join(&candidate.bold))?,
        italic: load_font(&candidate.dir.join(&candidate.italic))?,
        bold_italic: load_font(&candidate.dir.join(&candidate.bold_italic))?,
    })
}

/// Load the first complete font family among `candidates`
fn load_font_family(candidates: &[FontCandidate]) -> Result<FontFamily<FontData>> {
    let mut last_error = None;
    for candidate in candidates {
        match load_candidate(candidate) {
            Ok(family) => {
                info!(dir = %candidate.dir.display(), "Loaded report font");
                return Ok(family);
            }
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("No font locations configured")))
        .context("No usable font family found for the report")
}

/// genpdf-backed [`ReportGenerator`]
pub(crate) struct PdfReport {
    settings: ReportConfig,
    layout: Arc<Layout>,
    images_per_row: u32,
}

impl PdfReport {
    pub fn new(settings: ReportConfig, layout: Arc<Layout>, images_per_row: u32) -> Self {
        Self {
            settings,
            layout,
            images_per_row: images_per_row.max(1),
        }
    }

    fn font_candidates(&self) -> Vec<FontCandidate> {
        let mut candidates = Vec::new();
        if let Some(dir) = &self.settings.font_dir {
            candidates.push(FontCandidate::named(dir, &self.settings.font_name));
        }
        candidates.push(FontCandidate::named(
            "/usr/share/fonts/truetype/liberation",
            "LiberationSans",
        ));
        candidates.push(FontCandidate::named(
            "/usr/share/fonts/liberation-sans",
            "LiberationSans",
        ));
        candidates.push(FontCandidate::explicit(
            "/System/Library/Fonts/Supplemental",
            ["Arial.ttf", "Arial Bold.ttf", "Arial Italic.ttf", "Arial Bold Italic.ttf"],
        ));
        candidates.push(FontCandidate::explicit(
            "C:\\Windows\\Fonts",
            ["arial.ttf", "arialbd.ttf", "ariali.ttf", "arialbi.ttf"],
        ));
        candidates
    }

    fn usable_width_mm() -> f64 {
        PAGE_WIDTH_MM - 2.0 * MARGIN_MM
    }

    fn column_weights(&self) -> Vec<usize> {
        let mut weights = vec![TEXT_WEIGHT, TEXT_WEIGHT];
        if self.settings.reference_dir.is_some() {
            weights.push(IMAGE_WEIGHT);
        }
        weights.extend(std::iter::repeat(IMAGE_WEIGHT).take(self.images_per_row as usize));
        weights.push(RESULT_WEIGHT);
        weights
    }

    /// Width an image may take inside its cell
    fn image_width_mm(&self) -> f64 {
        let total: usize = self.column_weights().iter().sum();
        Self::usable_width_mm() * IMAGE_WEIGHT as f64 / total as f64 - 2.0 * CELL_PADDING_MM
    }

    fn text_cell(text: impl Into<String>, style: Style) -> LinearLayout {
        let mut cell = LinearLayout::vertical();
        cell.push(
            Paragraph::new(text.into())
                .aligned(Alignment::Center)
                .styled(style)
                .padded(Margins::all(CELL_PADDING_MM)),
        );
        cell
    }

    fn image_cell(&self, path: &Path, placeholder: &str) -> LinearLayout {
        let target_mm = self.image_width_mm();
        let scale = match image::image_dimensions(path) {
            Ok((width, _)) => image_scale(width, target_mm),
            Err(e) => {
                warn!(path = %path.display(), "Cannot read image for report: {}", e);
                return Self::text_cell(placeholder, Style::new().with_font_size(TABLE_SIZE));
            }
        };

        match Image::from_path(path) {
            Ok(image) => {
                let mut cell = LinearLayout::vertical();
                cell.push(
                    image
                        .with_scale(Scale::new(scale, scale))
                        .with_alignment(Alignment::Center)
                        .padded(Margins::all(CELL_PADDING_MM)),
                );
                cell
            }
            Err(e) => {
                warn!(path = %path.display(), "Cannot embed image in report: {}", e);
                Self::text_cell(placeholder, Style::new().with_font_size(TABLE_SIZE))
            }
        }
    }

    fn reference_cell(&self, category: &Category) -> LinearLayout {
        let placeholder = "No reference";
        match &self.settings.reference_dir {
            Some(dir) => {
                let path = dir.join(format!("{}.png", category.file_prefix()));
                if path.exists() {
                    self.image_cell(&path, placeholder)
                } else {
                    Self::text_cell(placeholder, Style::new().with_font_size(TABLE_SIZE))
                }
            }
            None => LinearLayout::vertical(),
        }
    }

    fn header(&self, metadata: &ReportMetadata) -> Result<TableLayout> {
        let mut table = TableLayout::new(vec![3, 1]);
        table
            .row()
            .element(
                Paragraph::new(self.settings.title.clone())
                    .styled(Style::new().bold().with_font_size(TITLE_SIZE)),
            )
            .element(
                Paragraph::new(format!("Date: {}", metadata.generated_at.format("%d.%m.%Y")))
                    .aligned(Alignment::Right)
                    .styled(Style::new().with_font_size(INFO_SIZE + 2)),
            )
            .push()
            .context("Failed to lay out report header")?;
        Ok(table)
    }

    fn info_lines(&self, identifier: &str, metadata: &ReportMetadata) -> Vec<String> {
        let points = self.settings.inspection_points.clone().unwrap_or_else(|| {
            self.layout
                .categories()
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        });
        vec![
            format!("1.   Unit: {}", identifier),
            format!("2.   Model: {}", metadata.model),
            format!("3.   Inspector: {}", metadata.inspector),
            format!("4.   Inspection points: {}", points),
        ]
    }

    fn table(&self, session: &SessionSnapshot) -> Result<TableLayout> {
        let mut table = TableLayout::new(self.column_weights());
        table.set_cell_decorator(FrameCellDecorator::new(true, true, false));

        let head = Style::new().bold().with_font_size(TABLE_SIZE);
        let body = Style::new().with_font_size(TABLE_SIZE);

        let mut header = table.row();
        header.push_element(Self::text_cell("Item", head));
        header.push_element(Self::text_cell("Criteria", head));
        if self.settings.reference_dir.is_some() {
            header.push_element(Self::text_cell("NG example", head));
        }
        for column in 0..self.images_per_row {
            let title = if column == 0 {
                "Inspection points".to_string()
            } else {
                String::new()
            };
            header.push_element(Self::text_cell(title, head));
        }
        header.push_element(Self::text_cell("Result", head));
        header.push().context("Failed to lay out table header")?;

        for category in self.layout.categories() {
            let captured = (1..=category.points)
                .filter(|p| session.image_for(&category.name, *p).is_some())
                .count();
            let result = if captured == category.points as usize {
                self.settings.result_text.clone()
            } else {
                format!("{}/{} captured", captured, category.points)
            };

            for (row_index, points) in point_rows(category.points, self.images_per_row)
                .into_iter()
                .enumerate()
            {
                let first = row_index == 0;
                let mut row = table.row();
                row.push_element(Self::text_cell(
                    if first { category.name.clone() } else { String::new() },
                    head,
                ));
                row.push_element(Self::text_cell(
                    if first {
                        category.criteria.clone().unwrap_or_default()
                    } else {
                        String::new()
                    },
                    body,
                ));
                if self.settings.reference_dir.is_some() {
                    row.push_element(if first {
                        self.reference_cell(category)
                    } else {
                        LinearLayout::vertical()
                    });
                }
                for column in 0..self.images_per_row as usize {
                    let cell = match points.get(column) {
                        Some(point) => match session.image_for(&category.name, *point) {
                            Some(path) => {
                                self.image_cell(path, &format!("Point {}: no image", point))
                            }
                            None => Self::text_cell(format!("Point {}: no image", point), body),
                        },
                        None => LinearLayout::vertical(),
                    };
                    row.push_element(cell);
                }
                row.push_element(Self::text_cell(
                    if first { result.clone() } else { String::new() },
                    head,
                ));
                row.push()
                    .with_context(|| format!("Failed to lay out row for {}", category.name))?;
            }
        }

        Ok(table)
    }
}

impl ReportGenerator for PdfReport {
    fn generate(&self, session: &SessionSnapshot, metadata: &ReportMetadata) -> Result<PathBuf> {
        let identifier = session
            .identifier
            .as_deref()
            .context("Cannot export a session without an identifier")?;
        let location = session
            .location
            .as_deref()
            .context("Cannot export a session without a storage location")?;
        let path = location.join(report_file_name(identifier));

        info!(
            path = %path.display(),
            identifier,
            filled = session.filled,
            total = session.total,
            "Generating inspection report"
        );

        let font_family = load_font_family(&self.font_candidates())
            .context("Failed to load font for PDF generation")?;

        let mut doc = Document::new(font_family);
        doc.set_title(format!("{} {}", self.settings.title, identifier));
        doc.set_paper_size(Size::new(PAGE_WIDTH_MM, PAGE_HEIGHT_MM));

        let mut decorator = SimplePageDecorator::new();
        decorator.set_margins(Margins::trbl(MARGIN_MM, MARGIN_MM, MARGIN_MM, MARGIN_MM));
        doc.set_page_decorator(decorator);

        doc.push(self.header(metadata)?);
        doc.push(Break::new(0.5));
        for line in self.info_lines(identifier, metadata) {
            doc.push(Paragraph::new(line).styled(Style::new().with_font_size(INFO_SIZE)));
        }
        doc.push(Break::new(0.8));
        doc.push(self.table(session)?);
        doc.push(Break::new(0.5));
        for line in &self.settings.footer {
            doc.push(Paragraph::new(line.clone()).styled(Style::new().with_font_size(FOOTER_SIZE)));
        }

        doc.render_to_file(&path)
            .with_context(|| format!("Failed to render PDF to {}", path.display()))?;

        info!(path = %path.display(), "Inspection report saved");
        Ok(path)
    }
}
