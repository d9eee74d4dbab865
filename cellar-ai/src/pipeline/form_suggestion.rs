//! Merging step results into a pre-filled tasting form
//!
//! Each field takes the first value available in priority order:
//! label extraction, then text analysis, then caller hints. A filled field
//! is never overwritten by a lower-priority source. Tasting sections
//! (appearance, nose, palate, conclusion) come from the analysis only.

use crate::models::{
    FieldSource, FormSuggestion, LabelExtraction, WineAnalysis, WineDetails, WineHints,
};
use crate::pipeline::PipelineError;
use std::collections::BTreeMap;

/// Fills empty slots and records which source filled them
struct Provenance<'a> {
    source: FieldSource,
    sources: &'a mut BTreeMap<String, FieldSource>,
    section: &'static str,
}

impl<'a> Provenance<'a> {
    fn new(source: FieldSource, sources: &'a mut BTreeMap<String, FieldSource>) -> Self {
        Self {
            source,
            sources,
            section: "",
        }
    }

    /// Prefix for the field paths recorded next
    fn section(&mut self, section: &'static str) {
        self.section = section;
    }

    fn record(&mut self, field: &str) {
        let path = format!("{}.{}", self.section, field);
        self.sources.insert(path, self.source);
    }

    fn text(&mut self, slot: &mut Option<String>, candidate: Option<&String>, field: &str) {
        if slot.is_some() {
            return;
        }
        if let Some(value) = candidate.map(|v| v.trim()).filter(|v| !v.is_empty()) {
            *slot = Some(value.to_string());
            self.record(field);
        }
    }

    fn value<T: Copy>(&mut self, slot: &mut Option<T>, candidate: Option<T>, field: &str) {
        if slot.is_none() {
            if let Some(value) = candidate {
                *slot = Some(value);
                self.record(field);
            }
        }
    }

    fn list(&mut self, slot: &mut Vec<String>, candidate: &[String], field: &str) {
        if !slot.is_empty() {
            return;
        }
        let values: Vec<String> = candidate
            .iter()
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect();
        if !values.is_empty() {
            *slot = values;
            self.record(field);
        }
    }
}

/// Records field values and where they came from
struct FormBuilder {
    form: FormSuggestion,
}

impl FormBuilder {
    fn new() -> Self {
        Self {
            form: FormSuggestion::default(),
        }
    }

    fn merge_wine(&mut self, details: &WineDetails, source: FieldSource) {
        let out = &mut self.form.wine;
        let mut fill = Provenance::new(source, &mut self.form.sources);
        fill.section("wine");
        fill.text(&mut out.name, details.name.as_ref(), "name");
        fill.text(&mut out.producer, details.producer.as_ref(), "producer");
        fill.value(&mut out.vintage, details.vintage, "vintage");
        fill.text(&mut out.region, details.region.as_ref(), "region");
        fill.text(&mut out.country, details.country.as_ref(), "country");
        fill.text(&mut out.wine_type, details.wine_type.as_ref(), "wine_type");
        fill.list(
            &mut out.grape_varieties,
            &details.grape_varieties,
            "grape_varieties",
        );
        fill.value(
            &mut out.alcohol_content,
            details.alcohol_content,
            "alcohol_content",
        );
    }

    fn merge_hints(&mut self, hints: &WineHints) {
        let details = WineDetails {
            name: hints.name.clone(),
            producer: hints.producer.clone(),
            vintage: hints.vintage,
            region: hints.region.clone(),
            country: hints.country.clone(),
            wine_type: hints.wine_type.clone(),
            grape_varieties: hints.grape_varieties.clone(),
            alcohol_content: None,
        };
        self.merge_wine(&details, FieldSource::Hints);
    }

    fn merge_tasting(&mut self, analysis: &WineAnalysis) {
        let form = &mut self.form;
        let mut fill = Provenance::new(FieldSource::Analysis, &mut form.sources);

        let a = &analysis.appearance;
        let out = &mut form.appearance;
        fill.section("appearance");
        fill.text(&mut out.clarity, a.clarity.as_ref(), "clarity");
        fill.text(&mut out.intensity, a.intensity.as_ref(), "intensity");
        fill.text(&mut out.color, a.color.as_ref(), "color");

        let n = &analysis.nose;
        let out = &mut form.nose;
        fill.section("nose");
        fill.text(&mut out.condition, n.condition.as_ref(), "condition");
        fill.text(&mut out.intensity, n.intensity.as_ref(), "intensity");
        fill.text(&mut out.development, n.development.as_ref(), "development");
        fill.list(&mut out.aromas, &n.aromas, "aromas");

        let p = &analysis.palate;
        let out = &mut form.palate;
        fill.section("palate");
        fill.text(&mut out.sweetness, p.sweetness.as_ref(), "sweetness");
        fill.text(&mut out.acidity, p.acidity.as_ref(), "acidity");
        fill.text(&mut out.tannin, p.tannin.as_ref(), "tannin");
        fill.text(&mut out.alcohol, p.alcohol.as_ref(), "alcohol");
        fill.text(&mut out.body, p.body.as_ref(), "body");
        fill.text(
            &mut out.flavor_intensity,
            p.flavor_intensity.as_ref(),
            "flavor_intensity",
        );
        fill.text(&mut out.finish, p.finish.as_ref(), "finish");
        fill.list(&mut out.flavors, &p.flavors, "flavors");

        let c = &analysis.conclusion;
        let out = &mut form.conclusion;
        fill.section("conclusion");
        fill.text(&mut out.quality, c.quality.as_ref(), "quality");
        fill.text(&mut out.readiness, c.readiness.as_ref(), "readiness");
        fill.value(&mut out.rating, c.rating, "rating");
        fill.text(
            &mut out.notes,
            c.notes.as_ref().or(analysis.summary.as_ref()),
            "notes",
        );
    }

    fn finish(self) -> FormSuggestion {
        self.form
    }
}

fn check_confidence(step: &str, confidence: u8) -> Result<(), PipelineError> {
    if confidence > 100 {
        return Err(PipelineError::FormMapping(format!(
            "{} reported confidence {} outside 0-100",
            step, confidence
        )));
    }
    Ok(())
}

/// Build a form suggestion from whatever results are available
///
/// Never fails for missing inputs; an empty form is a valid result. Fails
/// only when an input is internally inconsistent.
pub fn suggest_form(
    label: Option<&LabelExtraction>,
    analysis: Option<&WineAnalysis>,
    hints: Option<&WineHints>,
) -> Result<FormSuggestion, PipelineError> {
    if let Some(label) = label {
        check_confidence("label extraction", label.confidence)?;
    }
    if let Some(analysis) = analysis {
        check_confidence("text analysis", analysis.confidence)?;
        if analysis.conclusion.rating.is_some_and(|r| r > 100) {
            return Err(PipelineError::FormMapping(format!(
                "rating {:?} outside 0-100",
                analysis.conclusion.rating
            )));
        }
    }

    let mut builder = FormBuilder::new();
    if let Some(label) = label {
        builder.merge_wine(&label.wine, FieldSource::Label);
    }
    if let Some(analysis) = analysis {
        builder.merge_wine(&analysis.wine, FieldSource::Analysis);
        builder.merge_tasting(analysis);
    }
    if let Some(hints) = hints {
        builder.merge_hints(hints);
    }

    Ok(builder.finish())
}
