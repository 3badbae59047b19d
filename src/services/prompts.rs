//! Prompt builders for the drafting endpoints.
//!
//! Each prompt pins the exact JSON shape expected back so that
//! [`super::ai_output`] can parse it.

use rust_decimal::Decimal;
use std::fmt::Write;

/// Catalogue line offered to the model when drafting a devis
#[derive(Debug, Clone)]
pub struct CatalogueEntry {
    pub name: String,
    pub unit: String,
    pub unit_price: Decimal,
}

const JSON_ONLY: &str =
    "Réponds uniquement avec un objet JSON valide, sans texte avant ni après.";

fn quoted_list(values: &[String]) -> String {
    if values.is_empty() {
        return "(aucune)".to_string();
    }
    values
        .iter()
        .map(|v| format!("\"{}\"", v.replace('"', "'")))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn contact_prompt(description: &str) -> String {
    format!(
        "Tu aides une petite entreprise à saisir ses contacts.\n\
         À partir du texte ci-dessous, extrais la fiche du contact.\n\
         Format attendu : {{\"kind\": \"person\" | \"company\", \"name\": string, \
         \"email\": string | null, \"phone\": string | null, \"address\": string | null, \
         \"city\": string | null, \"country\": string | null, \"notes\": string | null, \
         \"tags\": [string]}}\n\
         N'invente aucune information absente du texte.\n\
         {}\n\nTexte :\n{}",
        JSON_ONLY,
        description.trim()
    )
}

pub fn product_prompt(description: &str, brands: &[String], categories: &[String]) -> String {
    format!(
        "Tu aides une petite entreprise à remplir son catalogue produits.\n\
         Décris le produit suivant.\n\
         Format attendu : {{\"name\": string, \"description\": string | null, \
         \"sku\": string | null, \"unit_price\": number | null, \"unit\": string | null, \
         \"brand\": string | null, \"category\": string | null}}\n\
         Marques existantes : {}\n\
         Catégories existantes : {}\n\
         Réutilise une marque ou une catégorie existante quand elle convient.\n\
         {}\n\nProduit :\n{}",
        quoted_list(brands),
        quoted_list(categories),
        JSON_ONLY,
        description.trim()
    )
}

pub fn brand_prompt(description: &str, count: usize, existing: &[String]) -> String {
    format!(
        "Propose {} noms de marque courts et mémorables pour l'activité décrite.\n\
         Évite ces marques déjà utilisées : {}\n\
         Format attendu : {{\"names\": [string]}}\n\
         {}\n\nActivité :\n{}",
        count,
        quoted_list(existing),
        JSON_ONLY,
        description.trim()
    )
}

pub fn devis_prompt(
    description: &str,
    contact_name: &str,
    currency: &str,
    catalogue: &[CatalogueEntry],
) -> String {
    let mut listing = String::new();
    for entry in catalogue {
        let _ = writeln!(
            listing,
            "- \"{}\" : {} {} / {}",
            entry.name.replace('"', "'"),
            entry.unit_price,
            currency,
            entry.unit
        );
    }
    if listing.is_empty() {
        listing.push_str("(catalogue vide)\n");
    }

    format!(
        "Tu prépares un devis pour le client \"{}\".\n\
         Décompose le travail demandé en lignes chiffrées, prix unitaires hors taxes en {}.\n\
         Quand un produit du catalogue convient, reprends exactement son nom et son prix.\n\
         Catalogue :\n{}\
         Format attendu : {{\"title\": string, \"notes\": string | null, \
         \"items\": [{{\"description\": string, \"quantity\": number, \"unit_price\": number}}]}}\n\
         {}\n\nTravail demandé :\n{}",
        contact_name.replace('"', "'"),
        currency,
        listing,
        JSON_ONLY,
        description.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_prompt_lists_existing_brands() {
        let prompt = product_prompt(
            "  sac de ciment 50kg ",
            &["Sococim".to_string()],
            &[],
        );
        assert!(prompt.contains("\"Sococim\""));
        assert!(prompt.contains("(aucune)"));
        assert!(prompt.ends_with("sac de ciment 50kg"));
    }

    #[test]
    fn devis_prompt_includes_catalogue_prices() {
        let catalogue = vec![CatalogueEntry {
            name: "Carrelage 60x60".to_string(),
            unit: "m²".to_string(),
            unit_price: Decimal::from(8500),
        }];
        let prompt = devis_prompt("refaire la cuisine", "Awa \"Diop\"", "XOF", &catalogue);
        assert!(prompt.contains("- \"Carrelage 60x60\" : 8500 XOF / m²"));
        assert!(prompt.contains("client \"Awa 'Diop'\""));

        let empty = devis_prompt("x", "y", "XOF", &[]);
        assert!(empty.contains("(catalogue vide)"));
    }

    #[test]
    fn every_prompt_asks_for_json_only() {
        for prompt in [
            contact_prompt("a"),
            product_prompt("a", &[], &[]),
            brand_prompt("a", 5, &[]),
            devis_prompt("a", "b", "XOF", &[]),
        ] {
            assert!(prompt.contains(JSON_ONLY));
        }
    }
}
