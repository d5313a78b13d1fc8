/// Postal address pieces as the admissions platform hands them over.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostalAddress {
    pub lines: Vec<String>,
    pub postal_code: String,
    pub city: String,
    pub country: String,
}

fn is_france(country: &str) -> bool {
    matches!(
        country.trim().to_ascii_uppercase().as_str(),
        "" | "FR" | "FRA" | "FRANCE"
    )
}

/// Renders an address as it should appear on an envelope.
///
/// French addresses put the postal code and city on one line; foreign ones
/// spell out each piece and add the country. Empty lines are dropped.
pub fn format_postal_address(address: &PostalAddress) -> String {
    let mut lines: Vec<String> = address.lines.iter().map(|line| line.trim().to_string()).collect();

    if is_france(&address.country) {
        lines.push(format!("{} {}", address.postal_code.trim(), address.city.trim()));
    } else {
        lines.push(address.postal_code.trim().to_string());
        lines.push(address.city.trim().to_string());
        lines.push(address.country.trim().to_string());
    }

    lines
        .into_iter()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
