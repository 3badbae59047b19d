//! Devis (quote) routes
//!
//! Totals are always recomputed here from the stored lines; clients never
//! send them. Numbers are allocated per organisation and year from
//! `devis_counters` inside the creating transaction.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{Postgres, Transaction};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::access::{require_permission, ActingUser};
use crate::api::{listing, Created, DataResponse, ListQuery, MessageResponse};
use crate::app::AppState;
use crate::domain::activity::NewActivity;
use crate::domain::devis::{
    format_devis_number, ChangeDevisStatusRequest, CompareTiersRequest, CreateDevisRequest,
    DevisFilter, DevisItemInput, DevisItemResponse, DevisResponse, DevisStatus,
    UpdateDevisRequest,
};
use crate::domain::pricing::{compare_tiers, price_devis, DevisTotals, LineInput, PricingTier};
use crate::domain::team::Permission;
use crate::error::{ApiError, ApiResult};
use crate::services::activity;

/// Database row for devis header
#[derive(Debug, sqlx::FromRow)]
struct DevisRow {
    id: Uuid,
    organisation_id: Uuid,
    contact_id: Uuid,
    contact_name: Option<String>,
    number: String,
    title: String,
    notes: Option<String>,
    tier: String,
    status: String,
    valid_until: Option<NaiveDate>,
    subtotal: Decimal,
    css: Decimal,
    tva: Decimal,
    total: Decimal,
    payment: Decimal,
    balance: Decimal,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DevisRow> for DevisResponse {
    type Error = ApiError;

    fn try_from(row: DevisRow) -> Result<Self, Self::Error> {
        let tier = PricingTier::parse(&row.tier)
            .ok_or_else(|| ApiError::internal(format!("Unknown tier '{}'", row.tier)))?;
        let status = DevisStatus::parse(&row.status)
            .ok_or_else(|| ApiError::internal(format!("Unknown devis status '{}'", row.status)))?;

        Ok(Self {
            id: row.id,
            organisation_id: row.organisation_id,
            contact_id: row.contact_id,
            contact_name: row.contact_name,
            number: row.number,
            title: row.title,
            notes: row.notes,
            tier,
            status,
            valid_until: row.valid_until,
            totals: DevisTotals {
                subtotal: row.subtotal,
                css: row.css,
                tva: row.tva,
                total: row.total,
                payment: row.payment,
                balance: row.balance,
            },
            items: Vec::new(),
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Database row for devis line
#[derive(Debug, sqlx::FromRow)]
struct DevisItemRow {
    id: Uuid,
    position: i32,
    product_id: Option<Uuid>,
    description: String,
    quantity: Decimal,
    unit_price: Decimal,
    tier_unit_price: Decimal,
    line_total: Decimal,
}

impl From<DevisItemRow> for DevisItemResponse {
    fn from(row: DevisItemRow) -> Self {
        Self {
            id: row.id,
            position: row.position,
            product_id: row.product_id,
            description: row.description,
            quantity: row.quantity,
            unit_price: row.unit_price,
            tier_unit_price: row.tier_unit_price,
            line_total: row.line_total,
        }
    }
}

const DEVIS_SELECT: &str = r#"
    SELECT d.id, d.organisation_id, d.contact_id, c.name AS contact_name, d.number, d.title,
           d.notes, d.tier, d.status, d.valid_until, d.subtotal, d.css, d.tva, d.total,
           d.payment, d.balance, d.created_by, d.created_at, d.updated_at
    FROM devis d
    LEFT JOIN contacts c ON c.id = d.contact_id
"#;

/// A line with its catalogue defaults filled in
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResolvedItem {
    pub product_id: Option<Uuid>,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

impl ResolvedItem {
    fn line(&self) -> LineInput {
        LineInput {
            unit_price: self.unit_price,
            quantity: self.quantity,
        }
    }
}

/// Header fields of a devis about to be inserted
pub(crate) struct NewDevis {
    pub contact_id: Uuid,
    pub title: String,
    pub notes: Option<String>,
    pub tier: PricingTier,
    pub valid_until: Option<NaiveDate>,
}

#[derive(Debug, sqlx::FromRow)]
struct CatalogueRow {
    id: Uuid,
    name: String,
    unit_price: Decimal,
}

/// Fill description and price from the catalogue for lines that name a
/// product. Explicit values on the line win.
async fn resolve_items(
    state: &AppState,
    org_id: Uuid,
    items: &[DevisItemInput],
) -> ApiResult<Vec<ResolvedItem>> {
    let product_ids: Vec<Uuid> = items.iter().filter_map(|i| i.product_id).collect();

    let catalogue: HashMap<Uuid, CatalogueRow> = if product_ids.is_empty() {
        HashMap::new()
    } else {
        sqlx::query_as::<_, CatalogueRow>(
            "SELECT id, name, unit_price FROM products WHERE organisation_id = $1 AND id = ANY($2)",
        )
        .bind(org_id)
        .bind(&product_ids)
        .fetch_all(&state.db)
        .await?
        .into_iter()
        .map(|row| (row.id, row))
        .collect()
    };

    merge_catalogue(items, &catalogue)
}

fn merge_catalogue(
    items: &[DevisItemInput],
    catalogue: &HashMap<Uuid, CatalogueRow>,
) -> ApiResult<Vec<ResolvedItem>> {
    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let product = match item.product_id {
                Some(id) => Some(catalogue.get(&id).ok_or_else(|| {
                    ApiError::bad_request(format!(
                        "items[{}].product_id does not belong to this organisation",
                        index
                    ))
                })?),
                None => None,
            };

            let description = item
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string)
                .or_else(|| product.map(|p| p.name.clone()))
                .ok_or_else(|| {
                    ApiError::validation(format!("items[{}].description is required", index))
                })?;

            let unit_price = item
                .unit_price
                .or_else(|| product.map(|p| p.unit_price))
                .ok_or_else(|| {
                    ApiError::validation(format!("items[{}].unit_price is required", index))
                })?;

            Ok(ResolvedItem {
                product_id: item.product_id,
                description,
                quantity: item.quantity,
                unit_price,
            })
        })
        .collect()
}

async fn check_contact(state: &AppState, org_id: Uuid, contact_id: Uuid) -> ApiResult<()> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM contacts WHERE id = $1 AND organisation_id = $2)",
    )
    .bind(contact_id)
    .bind(org_id)
    .fetch_one(&state.db)
    .await?;

    if !exists {
        return Err(ApiError::bad_request(
            "contact_id does not belong to this organisation",
        ));
    }
    Ok(())
}

async fn next_number(tx: &mut Transaction<'_, Postgres>, org_id: Uuid) -> ApiResult<String> {
    let year = Utc::now().year();
    let sequence: i32 = sqlx::query_scalar(
        r#"
        INSERT INTO devis_counters (organisation_id, year, last_value)
        VALUES ($1, $2, 1)
        ON CONFLICT (organisation_id, year)
        DO UPDATE SET last_value = devis_counters.last_value + 1
        RETURNING last_value
        "#,
    )
    .bind(org_id)
    .bind(year)
    .fetch_one(&mut **tx)
    .await?;

    Ok(format_devis_number(year, sequence))
}

/// Replace every line of a devis with the priced `items`.
async fn write_items(
    tx: &mut Transaction<'_, Postgres>,
    devis_id: Uuid,
    items: &[ResolvedItem],
    tier: PricingTier,
    state: &AppState,
) -> ApiResult<DevisTotals> {
    let lines: Vec<LineInput> = items.iter().map(ResolvedItem::line).collect();
    let (priced, totals) = price_devis(&lines, tier, &state.settings.tax)?;

    sqlx::query("DELETE FROM devis_items WHERE devis_id = $1")
        .bind(devis_id)
        .execute(&mut **tx)
        .await?;

    for (position, (item, line)) in items.iter().zip(&priced).enumerate() {
        sqlx::query(
            r#"
            INSERT INTO devis_items (id, devis_id, position, product_id, description, quantity,
                                     unit_price, tier_unit_price, line_total)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(devis_id)
        .bind(position as i32)
        .bind(item.product_id)
        .bind(&item.description)
        .bind(line.quantity)
        .bind(line.unit_price)
        .bind(line.tier_unit_price)
        .bind(line.line_total)
        .execute(&mut **tx)
        .await?;
    }

    Ok(totals)
}

async fn write_totals(
    tx: &mut Transaction<'_, Postgres>,
    devis_id: Uuid,
    totals: &DevisTotals,
) -> ApiResult<()> {
    sqlx::query(
        r#"
        UPDATE devis SET subtotal = $2, css = $3, tva = $4, total = $5, payment = $6,
                         balance = $7, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(devis_id)
    .bind(totals.subtotal)
    .bind(totals.css)
    .bind(totals.tva)
    .bind(totals.total)
    .bind(totals.payment)
    .bind(totals.balance)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Insert a draft devis with its lines; shared with the AI generator.
pub(crate) async fn insert_devis(
    state: &AppState,
    org_id: Uuid,
    user: ActingUser,
    header: NewDevis,
    items: &[ResolvedItem],
) -> ApiResult<DevisResponse> {
    check_contact(state, org_id, header.contact_id).await?;

    let devis_id = Uuid::new_v4();
    let mut tx = state.db.begin().await?;
    let number = next_number(&mut tx, org_id).await?;
    let zero = DevisTotals::from_subtotal(Decimal::ZERO, &state.settings.tax)?;

    sqlx::query(
        r#"
        INSERT INTO devis (id, organisation_id, contact_id, number, title, notes, tier, status,
                           valid_until, subtotal, css, tva, total, payment, balance, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        "#,
    )
    .bind(devis_id)
    .bind(org_id)
    .bind(header.contact_id)
    .bind(&number)
    .bind(&header.title)
    .bind(&header.notes)
    .bind(header.tier.as_str())
    .bind(DevisStatus::Draft.as_str())
    .bind(header.valid_until)
    .bind(zero.subtotal)
    .bind(zero.css)
    .bind(zero.tva)
    .bind(zero.total)
    .bind(zero.payment)
    .bind(zero.balance)
    .bind(user.user_id)
    .execute(&mut *tx)
    .await?;

    let totals = write_items(&mut tx, devis_id, items, header.tier, state).await?;
    write_totals(&mut tx, devis_id, &totals).await?;
    tx.commit().await?;

    state.cache.invalidate_overview(org_id).await;
    activity::record(
        &state.db,
        NewActivity::new(org_id, user.user_id, "devis.created", "devis", Some(devis_id))
            .with_details(serde_json::json!({ "number": number, "total": totals.total })),
    )
    .await;

    tracing::info!(
        organisation_id = %org_id,
        devis_id = %devis_id,
        number = %number,
        total = %totals.total,
        "Devis created"
    );

    fetch_devis(state, org_id, devis_id).await
}

/// Devis with its lines
async fn fetch_devis(state: &AppState, org_id: Uuid, devis_id: Uuid) -> ApiResult<DevisResponse> {
    let row = sqlx::query_as::<_, DevisRow>(&format!(
        "{} WHERE d.id = $1 AND d.organisation_id = $2",
        DEVIS_SELECT
    ))
    .bind(devis_id)
    .bind(org_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Devis not found"))?;

    let items = sqlx::query_as::<_, DevisItemRow>(
        r#"
        SELECT id, position, product_id, description, quantity, unit_price, tier_unit_price, line_total
        FROM devis_items
        WHERE devis_id = $1
        ORDER BY position
        "#,
    )
    .bind(devis_id)
    .fetch_all(&state.db)
    .await?;

    let mut devis = DevisResponse::try_from(row)?;
    devis.items = items.into_iter().map(Into::into).collect();
    Ok(devis)
}

/// GET /api/organisations/:org_id/devis
pub async fn list_devis(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
    Query(filter): Query<DevisFilter>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Read).await?;

    let rows = sqlx::query_as::<_, DevisRow>(&format!(
        "{} WHERE d.organisation_id = $1 ORDER BY d.created_at DESC",
        DEVIS_SELECT
    ))
    .bind(org_id)
    .fetch_all(&state.db)
    .await?;

    let devis: Vec<DevisResponse> = rows
        .into_iter()
        .map(DevisResponse::try_from)
        .collect::<ApiResult<Vec<_>>>()?
        .into_iter()
        .filter(|d| d.matches(&filter))
        .collect();

    Ok(listing::apply(devis, &query))
}

/// GET /api/organisations/:org_id/devis/:devis_id
pub async fn get_devis(
    State(state): State<Arc<AppState>>,
    Path((org_id, devis_id)): Path<(Uuid, Uuid)>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Read).await?;
    Ok(Json(DataResponse::new(fetch_devis(&state, org_id, devis_id).await?)))
}

/// POST /api/organisations/:org_id/devis
pub async fn create_devis(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<Uuid>,
    user: ActingUser,
    Json(req): Json<CreateDevisRequest>,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Write).await?;
    let req = req.validated()?;
    let items = resolve_items(&state, org_id, &req.items).await?;

    let devis = insert_devis(
        &state,
        org_id,
        user,
        NewDevis {
            contact_id: req.contact_id,
            title: req.title,
            notes: req.notes,
            tier: req.tier,
            valid_until: req.valid_until,
        },
        &items,
    )
    .await?;

    Ok(Created(devis))
}

/// PATCH /api/organisations/:org_id/devis/:devis_id
///
/// Only drafts can change. Lines are repriced on every update so a tier
/// change alone also moves the totals.
pub async fn update_devis(
    State(state): State<Arc<AppState>>,
    Path((org_id, devis_id)): Path<(Uuid, Uuid)>,
    user: ActingUser,
    Json(req): Json<UpdateDevisRequest>,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Write).await?;
    let req = req.validated()?;

    let current = fetch_devis(&state, org_id, devis_id).await?;
    if !current.status.is_editable() {
        return Err(ApiError::conflict(format!(
            "Devis {} is {} and can no longer be edited",
            current.number,
            current.status.as_str()
        )));
    }

    if let Some(contact_id) = req.contact_id {
        check_contact(&state, org_id, contact_id).await?;
    }

    let items = match &req.items {
        Some(items) => resolve_items(&state, org_id, items).await?,
        None => current
            .items
            .iter()
            .map(|i| ResolvedItem {
                product_id: i.product_id,
                description: i.description.clone(),
                quantity: i.quantity,
                unit_price: i.unit_price,
            })
            .collect(),
    };
    let tier = req.tier.unwrap_or(current.tier);

    let mut tx = state.db.begin().await?;

    let updated = sqlx::query(
        r#"
        UPDATE devis SET
            contact_id = COALESCE($3, contact_id),
            title = COALESCE($4, title),
            notes = CASE WHEN $5 THEN $6 ELSE notes END,
            tier = $7,
            valid_until = CASE WHEN $8 THEN $9 ELSE valid_until END,
            updated_at = NOW()
        WHERE id = $1 AND organisation_id = $2 AND status = 'draft'
        "#,
    )
    .bind(devis_id)
    .bind(org_id)
    .bind(req.contact_id)
    .bind(&req.title)
    .bind(req.notes.is_some())
    .bind(req.notes.clone().flatten())
    .bind(tier.as_str())
    .bind(req.valid_until.is_some())
    .bind(req.valid_until.flatten())
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(ApiError::conflict("Devis changed status while being edited"));
    }

    let totals = write_items(&mut tx, devis_id, &items, tier, &state).await?;
    write_totals(&mut tx, devis_id, &totals).await?;
    tx.commit().await?;

    state.cache.invalidate_overview(org_id).await;
    activity::record(
        &state.db,
        NewActivity::new(org_id, user.user_id, "devis.updated", "devis", Some(devis_id))
            .with_details(serde_json::json!({ "total": totals.total, "tier": tier })),
    )
    .await;

    Ok(Json(DataResponse::new(fetch_devis(&state, org_id, devis_id).await?)))
}

/// POST /api/organisations/:org_id/devis/:devis_id/status
pub async fn change_devis_status(
    State(state): State<Arc<AppState>>,
    Path((org_id, devis_id)): Path<(Uuid, Uuid)>,
    user: ActingUser,
    Json(req): Json<ChangeDevisStatusRequest>,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Write).await?;

    let current = fetch_devis(&state, org_id, devis_id).await?;
    if !current.status.can_transition_to(req.status) {
        return Err(ApiError::conflict(format!(
            "Cannot move devis from {} to {}",
            current.status.as_str(),
            req.status.as_str()
        )));
    }

    let result = sqlx::query(
        r#"
        UPDATE devis SET status = $4, updated_at = NOW()
        WHERE id = $1 AND organisation_id = $2 AND status = $3
        "#,
    )
    .bind(devis_id)
    .bind(org_id)
    .bind(current.status.as_str())
    .bind(req.status.as_str())
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::conflict("Devis status changed concurrently, reload and retry"));
    }

    state.cache.invalidate_overview(org_id).await;
    activity::record(
        &state.db,
        NewActivity::new(org_id, user.user_id, "devis.status_changed", "devis", Some(devis_id))
            .with_details(serde_json::json!({ "from": current.status, "to": req.status })),
    )
    .await;

    tracing::info!(
        devis_id = %devis_id,
        from = current.status.as_str(),
        to = req.status.as_str(),
        "Devis status changed"
    );

    Ok(Json(DataResponse::new(fetch_devis(&state, org_id, devis_id).await?)))
}

/// DELETE /api/organisations/:org_id/devis/:devis_id
///
/// Only drafts can be deleted; sent devis are kept for the record.
pub async fn delete_devis(
    State(state): State<Arc<AppState>>,
    Path((org_id, devis_id)): Path<(Uuid, Uuid)>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Delete).await?;

    let current = fetch_devis(&state, org_id, devis_id).await?;
    if current.status != DevisStatus::Draft {
        return Err(ApiError::conflict(format!(
            "Devis {} is {}; only drafts can be deleted",
            current.number,
            current.status.as_str()
        )));
    }

    let result = sqlx::query(
        "DELETE FROM devis WHERE id = $1 AND organisation_id = $2 AND status = 'draft'",
    )
    .bind(devis_id)
    .bind(org_id)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::conflict("Devis changed status, reload and retry"));
    }

    state.cache.invalidate_overview(org_id).await;
    activity::record(
        &state.db,
        NewActivity::new(org_id, user.user_id, "devis.deleted", "devis", Some(devis_id))
            .with_details(serde_json::json!({ "number": current.number })),
    )
    .await;

    Ok(Json(MessageResponse::new("Devis deleted successfully")))
}

/// POST /api/organisations/:org_id/pricing/compare
///
/// Price the same lines under every tier. Nothing is stored.
pub async fn compare_devis_tiers(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<Uuid>,
    user: ActingUser,
    Json(req): Json<CompareTiersRequest>,
) -> ApiResult<impl IntoResponse> {
    require_permission(&state.db, org_id, user, Permission::Read).await?;
    crate::domain::devis::validate_items(&req.items)?;

    let items = resolve_items(&state, org_id, &req.items).await?;
    let lines: Vec<LineInput> = items.iter().map(ResolvedItem::line).collect();

    let quotes = compare_tiers(&lines, &state.settings.tax)?;
    Ok(Json(DataResponse::new(quotes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalogue(id: Uuid) -> HashMap<Uuid, CatalogueRow> {
        HashMap::from([(
            id,
            CatalogueRow {
                id,
                name: "Ciment CPJ 45".to_string(),
                unit_price: Decimal::from(4750),
            },
        )])
    }

    fn inputs(value: serde_json::Value) -> Vec<DevisItemInput> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn catalogue_fills_missing_fields() {
        let id = Uuid::new_v4();
        let items = inputs(json!([
            { "product_id": id, "quantity": 10 },
            { "product_id": id, "quantity": 2, "description": "Ciment (remise)", "unit_price": 4500 },
            { "description": "Main d'oeuvre", "quantity": 1, "unit_price": 30000 }
        ]));

        let resolved = merge_catalogue(&items, &catalogue(id)).unwrap();
        assert_eq!(resolved[0].description, "Ciment CPJ 45");
        assert_eq!(resolved[0].unit_price, Decimal::from(4750));
        assert_eq!(resolved[1].description, "Ciment (remise)");
        assert_eq!(resolved[1].unit_price, Decimal::from(4500));
        assert_eq!(resolved[2].product_id, None);
    }

    #[test]
    fn foreign_product_is_rejected() {
        let items = inputs(json!([{ "product_id": Uuid::new_v4(), "quantity": 1 }]));
        let err = merge_catalogue(&items, &catalogue(Uuid::new_v4())).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn resolved_lines_price_like_the_pricing_module() {
        let id = Uuid::new_v4();
        let items = inputs(json!([{ "product_id": id, "quantity": 3 }]));
        let resolved = merge_catalogue(&items, &catalogue(id)).unwrap();
        let lines: Vec<LineInput> = resolved.iter().map(ResolvedItem::line).collect();

        let (priced, totals) =
            price_devis(&lines, PricingTier::Premium, &crate::config::TaxRates::default())
                .unwrap();
        // 4750 * 1.15 = 5462.5, rounded half away from zero
        assert_eq!(priced[0].tier_unit_price, Decimal::from(5463));
        assert_eq!(totals.subtotal, Decimal::from(16389));
        assert_eq!(totals.payment + totals.balance, totals.total);
    }
}
