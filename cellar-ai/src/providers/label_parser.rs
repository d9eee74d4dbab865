//! Heuristic extraction of wine details from detected label text
//!
//! OCR returns the label as lines of text. This module picks out the
//! vintage, alcohol content, grape varieties, wine type, region and country
//! from well-known vocabularies, then chooses producer and name lines.

use crate::models::{WineDetails, WineHints};

const PRODUCER_MARKERS: &[&str] = &[
    "château", "chateau", "domaine", "bodega", "bodegas", "weingut", "tenuta", "estate",
    "winery", "vineyards", "vineyard", "cellars", "maison", "cantina", "quinta", "clos",
    "azienda", "fattoria", "castello",
];

const GRAPES: &[&str] = &[
    "Cabernet Sauvignon", "Cabernet Franc", "Merlot", "Pinot Noir", "Pinot Grigio",
    "Pinot Gris", "Pinot Blanc", "Chardonnay", "Sauvignon Blanc", "Syrah", "Shiraz",
    "Grenache", "Garnacha", "Tempranillo", "Sangiovese", "Nebbiolo", "Barbera", "Malbec",
    "Zinfandel", "Primitivo", "Riesling", "Gewürztraminer", "Chenin Blanc", "Viognier",
    "Mourvèdre", "Carménère", "Gamay", "Grüner Veltliner", "Albariño", "Sémillon",
    "Muscat", "Moscato", "Touriga Nacional", "Petit Verdot", "Corvina", "Aglianico",
];

/// Region names with the country they imply
const REGIONS: &[(&str, &str)] = &[
    ("Bordeaux", "France"),
    ("Bourgogne", "France"),
    ("Burgundy", "France"),
    ("Champagne", "France"),
    ("Chablis", "France"),
    ("Alsace", "France"),
    ("Beaujolais", "France"),
    ("Côtes du Rhône", "France"),
    ("Rhône", "France"),
    ("Loire", "France"),
    ("Vouvray", "France"),
    ("Sancerre", "France"),
    ("Provence", "France"),
    ("Rioja", "Spain"),
    ("Ribera del Duero", "Spain"),
    ("Priorat", "Spain"),
    ("Rías Baixas", "Spain"),
    ("Barolo", "Italy"),
    ("Barbaresco", "Italy"),
    ("Chianti", "Italy"),
    ("Toscana", "Italy"),
    ("Tuscany", "Italy"),
    ("Montalcino", "Italy"),
    ("Valpolicella", "Italy"),
    ("Piemonte", "Italy"),
    ("Mosel", "Germany"),
    ("Rheingau", "Germany"),
    ("Pfalz", "Germany"),
    ("Wachau", "Austria"),
    ("Douro", "Portugal"),
    ("Napa Valley", "USA"),
    ("Sonoma", "USA"),
    ("Willamette Valley", "USA"),
    ("Marlborough", "New Zealand"),
    ("Central Otago", "New Zealand"),
    ("Barossa", "Australia"),
    ("McLaren Vale", "Australia"),
    ("Margaret River", "Australia"),
    ("Mendoza", "Argentina"),
    ("Maipo", "Chile"),
    ("Stellenbosch", "South Africa"),
];

const COUNTRIES: &[(&str, &str)] = &[
    ("france", "France"),
    ("italia", "Italy"),
    ("italy", "Italy"),
    ("españa", "Spain"),
    ("spain", "Spain"),
    ("portugal", "Portugal"),
    ("deutschland", "Germany"),
    ("germany", "Germany"),
    ("österreich", "Austria"),
    ("austria", "Austria"),
    ("usa", "USA"),
    ("united states", "USA"),
    ("australia", "Australia"),
    ("new zealand", "New Zealand"),
    ("argentina", "Argentina"),
    ("chile", "Chile"),
    ("south africa", "South Africa"),
];

/// Keywords per wine type, checked in order
const WINE_TYPES: &[(&str, &[&str])] = &[
    (
        "sparkling",
        &["sparkling", "champagne", "crémant", "cremant", "cava", "prosecco", "spumante", "sekt"],
    ),
    ("fortified", &["port", "porto", "sherry", "jerez", "madeira", "marsala"]),
    (
        "dessert",
        &["sauternes", "late harvest", "eiswein", "ice wine", "tokaji", "vin santo", "dessert"],
    ),
    ("rosé", &["rosé", "rose", "rosato", "rosado"]),
    ("white", &["blanc", "white", "bianco", "blanco", "weiss", "weiß"]),
    ("red", &["rouge", "red", "rosso", "tinto"]),
];

/// Parse wine details out of raw label text
///
/// `current_year` bounds plausible vintages (1900 to next year).
pub fn parse_label_text(raw: &str, current_year: i32) -> WineDetails {
    let lines: Vec<&str> = raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let lowered = raw.to_lowercase();

    let vintage = find_vintage(&lines, current_year);
    let alcohol_content = find_alcohol(&lines);
    let grape_varieties = find_grapes(&lowered);
    let wine_type = find_wine_type(&lowered);
    let region = REGIONS
        .iter()
        .find(|(name, _)| contains_word(&lowered, &name.to_lowercase()))
        .map(|(name, _)| name.to_string());
    let country = COUNTRIES
        .iter()
        .find(|(needle, _)| contains_word(&lowered, needle))
        .map(|(_, country)| country.to_string())
        .or_else(|| {
            REGIONS
                .iter()
                .find(|(name, _)| Some(name.to_string()) == region)
                .map(|(_, country)| country.to_string())
        });

    let producer_index = lines.iter().position(|line| {
        let lower = line.to_lowercase();
        PRODUCER_MARKERS.iter().any(|m| contains_word(&lower, m))
    });
    let producer = producer_index.map(|i| lines[i].to_string());

    let name = lines
        .iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != producer_index)
        .map(|(_, line)| *line)
        .find(|line| is_name_candidate(line))
        .map(str::to_string);

    WineDetails {
        name,
        producer,
        vintage,
        region,
        country,
        wine_type,
        grape_varieties,
        alcohol_content,
    }
}

/// Fill gaps in parsed details from caller hints without overriding the label
pub fn apply_hints(details: &mut WineDetails, hints: Option<&WineHints>) {
    let Some(hints) = hints else {
        return;
    };
    if details.wine_type.is_none() {
        details.wine_type = hints.wine_type.clone();
    }
    if details.country.is_none() {
        details.country = hints.country.clone();
    }
}

fn find_vintage(lines: &[&str], current_year: i32) -> Option<i32> {
    lines.iter().find_map(|line| {
        tokens(line).find_map(|token| {
            if token.len() != 4 {
                return None;
            }
            token
                .parse::<i32>()
                .ok()
                .filter(|year| (1900..=current_year + 1).contains(year))
        })
    })
}

fn find_alcohol(lines: &[&str]) -> Option<f32> {
    lines.iter().find_map(|line| {
        let (before, _) = line.split_once('%')?;
        let number: String = before
            .trim_end()
            .chars()
            .rev()
            .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        number
            .replace(',', ".")
            .parse::<f32>()
            .ok()
            .filter(|abv| (5.0..=25.0).contains(abv))
    })
}

fn find_grapes(lowered: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for grape in GRAPES {
        if contains_word(lowered, &grape.to_lowercase()) && !found.iter().any(|g| g == grape) {
            found.push(grape.to_string());
        }
    }
    found
}

fn find_wine_type(lowered: &str) -> Option<String> {
    WINE_TYPES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| contains_word(lowered, k)))
        .map(|(wine_type, _)| wine_type.to_string())
}

/// Lines made of letters that aren't boilerplate like volume or ABV
fn is_name_candidate(line: &str) -> bool {
    let letters = line.chars().filter(|c| c.is_alphabetic()).count();
    if letters < 3 {
        return false;
    }
    let lower = line.to_lowercase();
    let boilerplate = [
        "% vol", "alc.", "alc ", "contains sulfites", "contains sulphites", "produce of",
        "product of", "bottled by", "mis en bouteille",
    ];
    !boilerplate.iter().any(|b| lower.contains(b)) && !is_volume_line(&lower)
}

/// "750 ml", "75cl", "1.5 L"
fn is_volume_line(lower: &str) -> bool {
    let numeric = |c: char| c.is_ascii_digit() || c == '.' || c == ',';
    let parts: Vec<&str> = lower.split_whitespace().collect();
    parts.iter().enumerate().any(|(i, part)| {
        let unit = part.trim_start_matches(numeric);
        let has_number = unit.len() < part.len()
            || i.checked_sub(1)
                .and_then(|p| parts.get(p))
                .is_some_and(|prev| prev.chars().all(numeric));
        has_number && matches!(unit, "ml" | "cl" | "l")
    })
}

fn tokens(line: &str) -> impl Iterator<Item = &str> {
    line.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
}

/// Substring match that respects word boundaries on both sides
fn contains_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(start, matched)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + matched.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
