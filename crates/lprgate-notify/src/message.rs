//! Entry message formatting
//!
//! Builds the text sent to the relay when a vehicle enters.

/// Default entry template
pub const ENTRY_TEMPLATE: &str = "Nova entrada: Veículo *{PLACA}* - cor *{COR}*";

/// Label used when the camera reported no usable color
pub const UNKNOWN_COLOR_LABEL: &str = "não informada";

const VEHICLE_COLORS: &[(&str, &str)] = &[
    ("Beige", "Bege"),
    ("Black", "Preto"),
    ("Blue", "Azul"),
    ("Bronze", "Bronze"),
    ("Brown", "Marrom"),
    ("Charcoal", "Grafite"),
    ("Copper", "Cobre"),
    ("Cream", "Creme"),
    ("Gold", "Dourado"),
    ("Gray", "Cinza"),
    ("Green", "Verde"),
    ("Maroon", "Vinho"),
    ("Multicolor", "Multicolorido"),
    ("Orange", "Laranja"),
    ("Pink", "Rosa"),
    ("Purple", "Roxo"),
    ("Red", "Vermelho"),
    ("Silver", "Prata"),
    ("Tan", "Castanho"),
    ("Turquoise", "Turquesa"),
    ("Violet", "Violeta"),
    ("White", "Branco"),
    ("Yellow", "Amarelo"),
];

/// Translate a camera color name to Portuguese
///
/// `N/A`, `Unknown` and empty input yield `None`; unknown names pass through.
pub fn translate_vehicle_color(color: &str) -> Option<&str> {
    if color.is_empty() || color == "N/A" || color == "Unknown" {
        return None;
    }

    Some(
        VEHICLE_COLORS
            .iter()
            .find(|(english, _)| *english == color)
            .map(|(_, portuguese)| *portuguese)
            .unwrap_or(color),
    )
}

/// Substitute template variables
///
/// Supported variables:
/// - `{PLACA}`: plate number
/// - `{COR}`: vehicle color label
/// - `{MANUTENCOES}`: removed
pub fn format_template(template: &str, plate: &str, color: &str) -> String {
    template
        .replace("{PLACA}", plate)
        .replace("{COR}", color)
        .replace("{MANUTENCOES}", "")
        .trim()
        .to_string()
}

/// Entry message for a plate and the raw camera color
pub fn entry_message(plate: &str, vehicle_color: Option<&str>) -> String {
    let raw = vehicle_color.unwrap_or_default().trim();
    let label = translate_vehicle_color(raw)
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN_COLOR_LABEL.to_string())
        .to_lowercase();
    format_template(ENTRY_TEMPLATE, plate, &label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_known_colors() {
        assert_eq!(translate_vehicle_color("White"), Some("Branco"));
        assert_eq!(translate_vehicle_color("Charcoal"), Some("Grafite"));
        assert_eq!(translate_vehicle_color("Yellow"), Some("Amarelo"));
    }

    #[test]
    fn test_translate_missing_colors() {
        assert_eq!(translate_vehicle_color(""), None);
        assert_eq!(translate_vehicle_color("N/A"), None);
        assert_eq!(translate_vehicle_color("Unknown"), None);
    }

    #[test]
    fn test_unknown_color_passes_through() {
        assert_eq!(translate_vehicle_color("Lilac"), Some("Lilac"));
    }

    #[test]
    fn test_format_template_strips_maintenance_placeholder() {
        let text = format_template("{MANUTENCOES} Placa {PLACA} / {COR} ", "ABC1234", "azul");
        assert_eq!(text, "Placa ABC1234 / azul");
    }

    #[test]
    fn test_entry_message() {
        assert_eq!(
            entry_message("ABC1234", Some("White")),
            "Nova entrada: Veículo *ABC1234* - cor *branco*"
        );
        assert_eq!(
            entry_message("ABC1234", Some("N/A")),
            "Nova entrada: Veículo *ABC1234* - cor *não informada*"
        );
        assert_eq!(
            entry_message("ABC1234", Some("Lilac")),
            "Nova entrada: Veículo *ABC1234* - cor *lilac*"
        );
        assert_eq!(
            entry_message("ABC1234", None),
            "Nova entrada: Veículo *ABC1234* - cor *não informada*"
        );
    }
}
