pub mod activity;
pub mod ai;
pub mod catalogue;
pub mod contacts;
pub mod devis;
pub mod documents;
pub mod favorites;
pub mod health;
pub mod organisations;
pub mod products;
pub mod tasks;
pub mod team;

use axum::{
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;

use crate::app::AppState;

/// Build the API router with all routes
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Public routes
        .route("/health", get(health::health_check))
        // Organisations
        .route(
            "/organisations",
            post(organisations::create_organisation).get(organisations::list_my_organisations),
        )
        .route("/slugs/:slug", get(organisations::get_organisation_by_slug))
        .route(
            "/organisations/:org_id",
            get(organisations::get_organisation)
                .patch(organisations::update_organisation)
                .delete(organisations::archive_organisation),
        )
        .route("/organisations/:org_id/overview", get(organisations::get_overview))
        // Team
        .route(
            "/organisations/:org_id/members",
            get(team::list_members).post(team::add_member),
        )
        .route(
            "/organisations/:org_id/members/:user_id",
            patch(team::update_member).delete(team::remove_member),
        )
        // Contacts
        .route(
            "/organisations/:org_id/contacts",
            get(contacts::list_contacts).post(contacts::create_contact),
        )
        .route(
            "/organisations/:org_id/contacts/:contact_id",
            get(contacts::get_contact).patch(contacts::update_contact),
        )
        .route(
            "/organisations/:org_id/contacts/:contact_id/archive",
            post(contacts::archive_contact),
        )
        .route(
            "/organisations/:org_id/contacts/:contact_id/unarchive",
            post(contacts::unarchive_contact),
        )
        // Catalogue
        .route(
            "/organisations/:org_id/brands",
            get(catalogue::list_brands).post(catalogue::create_brand),
        )
        .route(
            "/organisations/:org_id/brands/:brand_id",
            get(catalogue::get_brand)
                .patch(catalogue::update_brand)
                .delete(catalogue::delete_brand),
        )
        .route(
            "/organisations/:org_id/categories",
            get(catalogue::list_categories).post(catalogue::create_category),
        )
        .route(
            "/organisations/:org_id/categories/:category_id",
            get(catalogue::get_category)
                .patch(catalogue::update_category)
                .delete(catalogue::delete_category),
        )
        .route(
            "/organisations/:org_id/products",
            get(products::list_products).post(products::create_product),
        )
        .route(
            "/organisations/:org_id/products/:product_id",
            get(products::get_product)
                .patch(products::update_product)
                .delete(products::delete_product),
        )
        .route(
            "/organisations/:org_id/products/:product_id/archive",
            post(products::archive_product),
        )
        .route(
            "/organisations/:org_id/products/:product_id/unarchive",
            post(products::unarchive_product),
        )
        // Devis
        .route(
            "/organisations/:org_id/devis",
            get(devis::list_devis).post(devis::create_devis),
        )
        .route(
            "/organisations/:org_id/devis/:devis_id",
            get(devis::get_devis)
                .patch(devis::update_devis)
                .delete(devis::delete_devis),
        )
        .route(
            "/organisations/:org_id/devis/:devis_id/status",
            post(devis::change_devis_status),
        )
        .route(
            "/organisations/:org_id/pricing/compare",
            post(devis::compare_devis_tiers),
        )
        // Documents
        .route(
            "/organisations/:org_id/documents",
            get(documents::list_documents).post(documents::create_document),
        )
        .route(
            "/organisations/:org_id/documents/:document_id",
            get(documents::get_document).patch(documents::rename_document),
        )
        .route(
            "/organisations/:org_id/documents/:document_id/archive",
            post(documents::archive_document),
        )
        // Favourites
        .route("/organisations/:org_id/favorites", get(favorites::list_favorites))
        .route(
            "/organisations/:org_id/favorites/toggle",
            post(favorites::toggle_favorite),
        )
        // Tasks
        .route(
            "/organisations/:org_id/tasks",
            get(tasks::list_tasks).post(tasks::create_task),
        )
        .route(
            "/organisations/:org_id/tasks/:task_id",
            get(tasks::get_task)
                .patch(tasks::update_task)
                .delete(tasks::delete_task),
        )
        // Activity
        .route("/organisations/:org_id/activity", get(activity::list_activity))
        // AI drafting
        .route("/organisations/:org_id/ai/draft-contact", post(ai::draft_contact))
        .route("/organisations/:org_id/ai/draft-product", post(ai::draft_product))
        .route("/organisations/:org_id/ai/suggest-brands", post(ai::suggest_brands))
        .route("/organisations/:org_id/devisia/create", post(ai::generate_devis))
}
