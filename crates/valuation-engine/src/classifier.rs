use valuation_core::Sector;

const SYNONYMS: &[(Sector, &[&str])] = &[
    (
        Sector::Bfsi,
        &[
            "bfsi",
            "bank",
            "banks",
            "banking",
            "private bank",
            "public sector bank",
            "financial",
            "financials",
            "financial services",
            "finance",
            "nbfc",
            "insurance",
            "banking & financial services",
            "banking and financial services",
        ],
    ),
    (
        Sector::It,
        &[
            "it",
            "information technology",
            "software",
            "tech",
            "technology",
            "it services",
            "it - software",
            "computers - software",
            "software & services",
        ],
    ),
    (
        Sector::Pharma,
        &[
            "pharma",
            "pharmaceuticals",
            "pharmaceutical",
            "healthcare",
            "health care",
            "biotech",
            "biotechnology",
            "life sciences",
        ],
    ),
    (
        Sector::RealEstate,
        &[
            "real estate",
            "realty",
            "realestate",
            "property",
            "properties",
            "reit",
            "construction & real estate",
        ],
    ),
    (
        Sector::Fmcg,
        &[
            "fmcg",
            "fast moving consumer goods",
            "consumer goods",
            "consumer staples",
            "food & beverages",
            "food and beverages",
            "personal care",
            "tobacco",
        ],
    ),
    (
        Sector::Energy,
        &[
            "energy",
            "oil & gas",
            "oil and gas",
            "oil",
            "gas",
            "petroleum",
            "refineries",
            "power",
            "utilities",
            "renewable energy",
        ],
    ),
    (
        Sector::Telecom,
        &[
            "telecom",
            "telecommunications",
            "telecommunication",
            "communication services",
            "telecom services",
        ],
    ),
    (
        Sector::Auto,
        &["auto", "automobile", "automobiles", "automotive", "auto components", "auto ancillaries"],
    ),
    (
        Sector::Metals,
        &[
            "metals",
            "metal",
            "metals & mining",
            "mining",
            "steel",
            "non-ferrous metals",
            "aluminium",
        ],
    ),
    (
        Sector::Chemicals,
        &[
            "chemicals",
            "chemical",
            "specialty chemicals",
            "agrochemicals",
            "fertilizers",
        ],
    ),
    (Sector::Textiles, &["textiles", "textile", "apparel", "garments"]),
    (Sector::Cement, &["cement", "cement & cement products", "building materials"]),
    (Sector::Diversified, &["diversified", "conglomerate", "conglomerates"]),
    (Sector::Other, &["other", "others"]),
];

/// Map a free-text sector label to the canonical taxonomy.
///
/// Total and idempotent: unmatched, empty or missing input is `Other`, and
/// classifying a canonical label returns the same sector.
pub fn classify(raw: Option<&str>) -> Sector {
    let Some(raw) = raw else {
        return Sector::Other;
    };
    let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    if normalized.is_empty() {
        return Sector::Other;
    }

    SYNONYMS
        .iter()
        .find(|(_, names)| names.contains(&normalized.as_str()))
        .map(|(sector, _)| *sector)
        .unwrap_or(Sector::Other)
}
