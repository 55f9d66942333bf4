//! Prompt template for listing extraction.

/// Build the extraction prompt for one listing text.
///
/// The listing is embedded as-is; the model is asked for a single JSON
/// object with a fixed set of keys.
pub fn build_extraction_prompt(text: &str) -> String {
    format!(
        r#"Extract information from this Italian rental listing. Reply with valid JSON only.

Listing: "{text}"

Extract these fields (use null when not found). When there are alternatives, pick the most likely one:
{{
    "price": monthly_price_in_euros_as_a_number,
    "location": "street if explicitly present, otherwise the zone (Leonardo|Città Studi|Bovisa) if mentioned",
    "property_type": "single_room|shared_room|apartment|studio",
    "telephone": "phone_number_if_found",
    "email": "email_if_found",
    "tenant_preference": "exactly one of male|female|indifferent, never more than one, never combined, never separated by commas or slashes",
    "available_start": "YY-MM-DD_if_found",
    "available_end": "YY-MM-DD_if_found",
    "num_bedrooms": number_of_bedrooms,
    "num_bathrooms": number_of_bathrooms,
    "flatmates_count": number_of_current_flatmates,
    "summary": "short summary of additional features of the home",
    "has_extra_expenses": true_if_there_are_costs_beyond_the_main_price_otherwise_false,
    "extra_expenses_details": "description of the extra costs if present, otherwise null"
}}

For location, use the street if it appears in the text. Without a street, use the zone (Leonardo, Città Studi, Bovisa) if mentioned. With neither, set it to null.

For tenant_preference: "ragazzo" means male, "ragazza" means female, "indifferente" or no preference means indifferent.

For summary, only include information not covered by the other fields, such as:
- Furnishing (furnished/unfurnished)
- Included services (wifi, cleaning, utilities)
- Proximity to public transport
- Special features of the property
- Particular contract conditions
- Additional or included expenses

If there is no additional information, set summary to "No additional information".

Reply with valid JSON only, without extra text or markdown.
JSON:
"#
    )
}
