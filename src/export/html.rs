// src/export/html.rs
//! Self-contained HTML rendering of a CV.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::NaiveDate;

use crate::environment::SiteConfig;
use crate::media_validator::sniff_image;
use crate::types::{CvDocument, Section, SectionKind, SectionPayload, Sex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HtmlVariant {
    /// Browser view: includes side-sale listings and certificate links.
    View,
    /// Input to the PDF renderer.
    Pdf,
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// `data:` URI for an inline photo. Unknown formats are dropped.
pub fn photo_data_uri(bytes: &[u8]) -> Option<String> {
    let kind = sniff_image(bytes)?;
    Some(format!("data:{};base64,{}", kind.mime(), STANDARD.encode(bytes)))
}

fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%m/%Y").to_string())
        .unwrap_or_default()
}

fn period(start: Option<NaiveDate>, end: Option<NaiveDate>) -> String {
    match (start, end) {
        (None, None) => String::new(),
        (Some(_), None) => format!("{} - Present", format_date(start)),
        _ => format!("{} - {}", format_date(start), format_date(end)),
    }
}

fn field(label: &str, value: &str) -> String {
    if value.trim().is_empty() {
        String::new()
    } else {
        format!(
            "<li><span class=\"label\">{}:</span> {}</li>",
            escape(label),
            escape(value)
        )
    }
}

fn section_heading(kind: SectionKind) -> &'static str {
    match kind {
        SectionKind::Experience => "Experience",
        SectionKind::Education => "Education",
        SectionKind::Course => "Courses",
        SectionKind::Skill => "Skills",
        SectionKind::Product => "Academic & Work Products",
        SectionKind::Recommendation => "Recommendations",
        SectionKind::GarageSale => "Garage Sale",
    }
}

fn render_entry(section: &Section, variant: HtmlVariant) -> String {
    let body = match &section.payload {
        SectionPayload::Experience(e) => format!(
            "<h3>{} <small>{}</small></h3><p class=\"period\">{}</p><ul>{}{}{}{}</ul><p>{}</p>",
            escape(&e.role),
            escape(&e.company),
            escape(&period(e.start_date, e.end_date)),
            field("Position", &e.position),
            field("Location", &e.location),
            field("Contact", &e.contact_name),
            field("Phone", &e.contact_phone),
            escape(&e.description)
        ),
        SectionPayload::Education(e) => format!(
            "<h3>{} <small>{}</small></h3><p class=\"period\">{}</p><ul>{}</ul>",
            escape(&e.title),
            escape(&e.institution),
            escape(&period(e.start_date, e.end_date)),
            field("Status", e.status.label())
        ),
        SectionPayload::Course(c) => format!(
            "<h3>{} <small>{}</small></h3><p class=\"period\">{}</p><ul>{}{}</ul><p>{}</p>",
            escape(&c.name),
            escape(&c.institution),
            escape(&period(c.start_date, c.end_date)),
            field("Sponsor", &c.sponsor),
            field(
                "Hours",
                &c.total_hours.map(|h| h.to_string()).unwrap_or_default()
            ),
            escape(&c.description)
        ),
        SectionPayload::Skill(s) => format!("<span class=\"skill\">{}</span>", escape(&s.name)),
        SectionPayload::Product(p) => format!(
            "<h3>{} <small>{}</small></h3><ul>{}{}</ul><p>{}</p>",
            escape(&p.title),
            escape(&p.product_type),
            field("Name", &p.name),
            field("Classifier", &p.classifier),
            escape(&p.description)
        ),
        SectionPayload::Recommendation(r) => format!(
            "<h3>{}</h3><ul>{}{}{}{}</ul><p>{}</p>",
            escape(&r.contact_name),
            field("Relation", &r.relation),
            field("Phone", &r.contact_phone),
            field("Sponsor", &r.sponsor),
            field("Date", &format_date(r.recognition_date)),
            escape(&r.description)
        ),
        SectionPayload::GarageSale(g) => format!(
            "<h3>{}</h3><ul>{}{}</ul><p>{}</p>",
            escape(&g.product_name),
            field("Condition", &format!("{:?}", g.condition)),
            field(
                "Price",
                &format!("{}.{:02}", g.price_cents / 100, g.price_cents % 100)
            ),
            escape(&g.description)
        ),
    };

    let certificate = match (&section.certificate, variant) {
        (Some(_), HtmlVariant::View) => format!(
            "<a class=\"certificate\" href=\"/api/certificates/{}/{}\">Certificate</a>",
            section.kind(),
            section.id
        ),
        _ => String::new(),
    };

    format!(
        "<div class=\"entry {}\">{}{}</div>",
        section.kind(),
        body,
        certificate
    )
}

fn render_profile(doc: &CvDocument, photo: Option<&[u8]>) -> String {
    let profile = &doc.profile;
    let photo_html = photo
        .and_then(photo_data_uri)
        .map(|uri| format!("<img class=\"photo\" alt=\"photo\" src=\"{}\">", uri))
        .unwrap_or_default();

    let sex = match profile.sex {
        Some(Sex::Male) => "Male",
        Some(Sex::Female) => "Female",
        None => "",
    };

    let details = [
        field("Profession", &profile.profession),
        field("Nationality", &profile.nationality),
        field("Birthplace", &profile.birthplace),
        field(
            "Birth date",
            &profile
                .birth_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
        ),
        field("Sex", sex),
        field("Marital status", &profile.marital_status),
        field("ID", profile.national_id.as_deref().unwrap_or("")),
        field("Driving license", &profile.driving_license),
        field("Mobile", &profile.mobile_phone),
        field("Phone", &profile.landline_phone),
        field("Email", doc.user.email.as_deref().unwrap_or("")),
        field("Address", &profile.home_address),
        field("Work address", &profile.work_address),
        field("Website", &profile.website),
    ]
    .concat();

    format!(
        "<header class=\"profile\">{}<h1>{}</h1><ul class=\"details\">{}</ul><p class=\"description\">{}</p></header>",
        photo_html,
        escape(&doc.full_name()),
        details,
        escape(&profile.description)
    )
}

/// Render `doc` as one self-contained HTML page. `photo` is inlined as a data URI.
pub fn render_cv_html(
    doc: &CvDocument,
    site: &SiteConfig,
    photo: Option<&[u8]>,
    variant: HtmlVariant,
) -> String {
    let mut body = String::new();
    body.push_str(&format!(
        "<div class=\"site-header\">{}</div><h2 class=\"index-title\">{}</h2>",
        escape(&site.site_header),
        escape(&site.index_title)
    ));
    body.push_str(&render_profile(doc, photo));

    for kind in SectionKind::ALL {
        if kind == SectionKind::GarageSale && variant == HtmlVariant::Pdf {
            continue;
        }
        let entries: Vec<String> = doc
            .sections_of(kind)
            .map(|s| render_entry(s, variant))
            .collect();
        if entries.is_empty() {
            continue;
        }
        body.push_str(&format!(
            "<section id=\"{}\"><h2>{}</h2>{}</section>",
            kind,
            section_heading(kind),
            entries.concat()
        ));
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title} - {name}</title>
<style>
@page {{ size: A4; margin: 18mm; }}
body {{ font-family: sans-serif; color: {text}; font-size: 11pt; }}
h1, h2 {{ color: {accent}; }}
h2 {{ border-bottom: 2px solid {accent}; padding-bottom: 2px; }}
.site-header {{ font-size: 9pt; text-transform: uppercase; color: {accent}; }}
.photo {{ float: right; width: 110px; height: 130px; object-fit: cover; }}
.entry {{ page-break-inside: avoid; margin-bottom: 10px; }}
.period {{ color: #777; margin: 0; }}
.label {{ font-weight: bold; }}
.skill {{ display: inline-block; margin: 2px 6px 2px 0; padding: 2px 8px; border: 1px solid {accent}; }}
</style>
</head>
<body>
{body}
</body>
</html>
"#,
        title = escape(&site.site_title),
        name = escape(&doc.full_name()),
        text = escape(&site.text_color),
        accent = escape(&site.accent_color),
        body = body
    )
}
