//! AI drafting endpoints.
//!
//! Each endpoint asks the generative model for a structured draft and hands
//! it back for review. Nothing is stored, except a generated devis when the
//! caller passes `save: true`.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::access::{require_permission, ActingUser};
use crate::api::DataResponse;
use crate::app::AppState;
use crate::domain::ai::{
    DevisDraft, DraftContactRequest, DraftProductRequest, GenerateDevisRequest,
    GenerateDevisResponse, SuggestBrandsRequest,
};
use crate::domain::catalogue::ProductResponse;
use crate::domain::pricing::{compare_tiers, price_devis, LineInput};
use crate::domain::require_text;
use crate::domain::team::Permission;
use crate::error::{ApiError, ApiResult};
use crate::middleware::request_id::RequestIdExt;
use crate::routes::catalogue::brand_names;
use crate::routes::devis::{insert_devis, NewDevis, ResolvedItem};
use crate::routes::organisations::load_organisation;
use crate::routes::products::load_products;
use crate::services::ai_output::MAX_BRAND_SUGGESTIONS;
use crate::services::prompts::CatalogueEntry;

const DEFAULT_BRAND_SUGGESTIONS: usize = 5;

/// Case-insensitive lookup of a name the model wrote
fn resolve_by_name(name: Option<&str>, options: &[(Uuid, String)]) -> Option<Uuid> {
    let wanted = name?.trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }
    options
        .iter()
        .find(|(_, n)| n.trim().to_lowercase() == wanted)
        .map(|(id, _)| *id)
}

/// Link draft lines to catalogue products. An exact name wins, otherwise
/// the longest product name contained in the line description.
fn link_products(draft: &mut DevisDraft, catalogue: &[ProductResponse]) {
    for item in &mut draft.items {
        let description = item.description.to_lowercase();
        let exact = catalogue
            .iter()
            .find(|p| p.name.to_lowercase() == description.trim());
        let contained = || {
            catalogue
                .iter()
                .filter(|p| !p.name.trim().is_empty())
                .filter(|p| description.contains(&p.name.to_lowercase()))
                .max_by_key(|p| p.name.len())
        };
        item.product_id = exact.or_else(contained).map(|p| p.id);
    }
}

async fn named_ids(state: &AppState, org_id: Uuid, table: &str) -> ApiResult<Vec<(Uuid, String)>> {
    let rows = sqlx::query_as::<_, (Uuid, String)>(&format!(
        "SELECT id, name FROM {} WHERE organisation_id = $1 ORDER BY name",
        table
    ))
    .bind(org_id)
    .fetch_all(&state.db)
    .await?;
    Ok(rows)
}

/// POST /api/organisations/:org_id/ai/draft-contact
pub async fn draft_contact(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<Uuid>,
    headers: HeaderMap,
    user: ActingUser,
    Json(req): Json<DraftContactRequest>,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Write).await?;
    let description = require_text("description", &req.description)?;

    let draft = state
        .ai_client
        .draft_contact(&description, headers.request_id())
        .await?;

    Ok(Json(DataResponse::new(draft)))
}

/// POST /api/organisations/:org_id/ai/draft-product
pub async fn draft_product(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<Uuid>,
    headers: HeaderMap,
    user: ActingUser,
    Json(req): Json<DraftProductRequest>,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Write).await?;
    let description = require_text("description", &req.description)?;

    let brands = named_ids(&state, org_id, "brands").await?;
    let categories = named_ids(&state, org_id, "categories").await?;
    let brand_list: Vec<String> = brands.iter().map(|(_, n)| n.clone()).collect();
    let category_list: Vec<String> = categories.iter().map(|(_, n)| n.clone()).collect();

    let mut draft = state
        .ai_client
        .draft_product(&description, &brand_list, &category_list, headers.request_id())
        .await?;

    draft.brand_id = resolve_by_name(draft.brand.as_deref(), &brands);
    draft.category_id = resolve_by_name(draft.category.as_deref(), &categories);

    Ok(Json(DataResponse::new(draft)))
}

/// POST /api/organisations/:org_id/ai/suggest-brands
pub async fn suggest_brands(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<Uuid>,
    headers: HeaderMap,
    user: ActingUser,
    Json(req): Json<SuggestBrandsRequest>,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Write).await?;
    let description = require_text("description", &req.description)?;
    let count = req
        .count
        .unwrap_or(DEFAULT_BRAND_SUGGESTIONS)
        .clamp(1, MAX_BRAND_SUGGESTIONS);

    let existing = brand_names(&state, org_id).await?;
    let suggestions = state
        .ai_client
        .suggest_brands(&description, count, &existing, headers.request_id())
        .await?;

    Ok(Json(DataResponse::new(suggestions)))
}

/// POST /api/organisations/:org_id/devisia/create
///
/// Draft devis lines from a job description, priced with the catalogue
/// and the organisation's tax rates.
pub async fn generate_devis(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<Uuid>,
    headers: HeaderMap,
    user: ActingUser,
    Json(req): Json<GenerateDevisRequest>,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Write).await?;
    let description = require_text("description", &req.description)?;

    let organisation = load_organisation(&state, org_id).await?;
    let contact_name: String = sqlx::query_scalar(
        "SELECT name FROM contacts WHERE id = $1 AND organisation_id = $2",
    )
    .bind(req.contact_id)
    .bind(org_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::bad_request("contact_id does not belong to this organisation"))?;

    let products: Vec<ProductResponse> = load_products(&state, org_id)
        .await?
        .into_iter()
        .filter(|p| !p.archived)
        .collect();
    let catalogue: Vec<CatalogueEntry> = products
        .iter()
        .map(|p| CatalogueEntry {
            name: p.name.clone(),
            unit: p.unit.clone(),
            unit_price: p.unit_price,
        })
        .collect();

    let mut draft = state
        .ai_client
        .draft_devis(
            &description,
            &contact_name,
            &organisation.currency,
            &catalogue,
            headers.request_id(),
        )
        .await?;
    link_products(&mut draft, &products);

    let lines: Vec<LineInput> = draft
        .items
        .iter()
        .map(|i| LineInput {
            unit_price: i.unit_price,
            quantity: i.quantity,
        })
        .collect();
    let (priced, totals) = price_devis(&lines, req.tier, &state.settings.tax)?;
    let tiers = compare_tiers(&lines, &state.settings.tax)?;

    let devis = if req.save {
        let items: Vec<ResolvedItem> = draft
            .items
            .iter()
            .map(|i| ResolvedItem {
                product_id: i.product_id,
                description: i.description.clone(),
                quantity: i.quantity,
                unit_price: i.unit_price,
            })
            .collect();
        let header = NewDevis {
            contact_id: req.contact_id,
            title: draft.title.clone(),
            notes: draft.notes.clone(),
            tier: req.tier,
            valid_until: None,
        };
        Some(insert_devis(&state, org_id, user, header, &items).await?)
    } else {
        None
    };

    tracing::info!(
        organisation_id = %org_id,
        lines = draft.items.len(),
        total = %totals.total,
        saved = devis.is_some(),
        "AI devis generated"
    );

    Ok(Json(DataResponse::new(GenerateDevisResponse {
        draft,
        tier: req.tier,
        lines: priced,
        totals,
        tiers,
        devis,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ai::DevisItemDraft;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn product(name: &str) -> ProductResponse {
        ProductResponse {
            id: Uuid::new_v4(),
            organisation_id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            sku: None,
            unit_price: Decimal::from(1000),
            unit: "u".to_string(),
            brand_id: None,
            brand_name: None,
            category_id: None,
            category_name: None,
            stock_quantity: None,
            archived: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn line(description: &str) -> DevisItemDraft {
        DevisItemDraft {
            description: description.to_string(),
            quantity: Decimal::ONE,
            unit_price: Decimal::from(1000),
            product_id: None,
        }
    }

    #[test]
    fn names_resolve_case_insensitively() {
        let id = Uuid::new_v4();
        let options = vec![(id, "Lafarge".to_string())];
        assert_eq!(resolve_by_name(Some(" lafarge "), &options), Some(id));
        assert_eq!(resolve_by_name(Some("Dangote"), &options), None);
        assert_eq!(resolve_by_name(Some(""), &options), None);
        assert_eq!(resolve_by_name(None, &options), None);
    }

    #[test]
    fn lines_link_to_the_best_product() {
        let ciment = product("Ciment");
        let ciment_cpj = product("Ciment CPJ 45");
        let sable = product("Sable");
        let catalogue = vec![ciment.clone(), ciment_cpj.clone(), sable.clone()];

        let mut draft = DevisDraft {
            title: "Dalle".to_string(),
            notes: None,
            items: vec![
                line("sable"),
                line("Fourniture ciment CPJ 45 (sacs de 50 kg)"),
                line("Main d'oeuvre"),
            ],
        };
        link_products(&mut draft, &catalogue);

        assert_eq!(draft.items[0].product_id, Some(sable.id));
        assert_eq!(draft.items[1].product_id, Some(ciment_cpj.id));
        assert_eq!(draft.items[2].product_id, None);
    }
}
