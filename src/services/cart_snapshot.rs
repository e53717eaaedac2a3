use crate::{
    entities::{
        cart_item::{self, Entity as CartItem},
        customer_address::{self, Entity as CustomerAddress},
        product::Entity as Product,
    },
    errors::ServiceError,
    services::pricing::PricedLine,
};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

/// Reads the user's cart and resolves each line to a priced product record
/// at the moment of checkout, producing a frozen snapshot. Also backs the
/// address selector: the address store itself is external, only ownership
/// and the default flag matter here.
#[derive(Clone)]
pub struct CartSnapshotService {
    db: Arc<DatabaseConnection>,
}

impl CartSnapshotService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Loads and prices the user's cart. Lines whose product no longer
    /// resolves (deleted or deactivated) are dropped with a warning; callers
    /// treat a snapshot that empties out as `EmptyOrder`.
    #[instrument(skip(self))]
    pub async fn load_snapshot(&self, user_id: Uuid) -> Result<Vec<PricedLine>, ServiceError> {
        let lines = CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .all(&*self.db)
            .await?;

        if lines.is_empty() {
            return Ok(Vec::new());
        }

        let product_ids: Vec<Uuid> = lines.iter().map(|l| l.product_id).collect();
        let products: HashMap<Uuid, _> = Product::find()
            .filter(crate::entities::product::Column::Id.is_in(product_ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut snapshot = Vec::with_capacity(lines.len());
        for line in lines {
            if line.quantity <= 0 {
                warn!(cart_item = %line.id, "skipping cart line with non-positive quantity");
                continue;
            }
            match products.get(&line.product_id) {
                Some(product) if product.is_active => snapshot.push(PricedLine {
                    product_id: product.id,
                    name: product.name.clone(),
                    unit_price: product.price,
                    unit_mrp: product.mrp,
                    quantity: line.quantity,
                }),
                Some(_) => {
                    warn!(product_id = %line.product_id, "skipping cart line for inactive product");
                }
                None => {
                    warn!(product_id = %line.product_id, "skipping cart line for unresolvable product");
                }
            }
        }

        Ok(snapshot)
    }

    /// Resolves the delivery address: an explicit id must exist and belong to
    /// the caller; with no id, the user's default address is used.
    #[instrument(skip(self))]
    pub async fn resolve_address(
        &self,
        user_id: Uuid,
        address_id: Option<Uuid>,
    ) -> Result<customer_address::Model, ServiceError> {
        match address_id {
            Some(id) => {
                let address = CustomerAddress::find_by_id(id)
                    .one(&*self.db)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound(format!("Address {} not found", id)))?;

                if address.user_id != user_id {
                    return Err(ServiceError::Unauthorized(
                        "address does not belong to the caller".to_string(),
                    ));
                }
                Ok(address)
            }
            None => CustomerAddress::find()
                .filter(customer_address::Column::UserId.eq(user_id))
                .filter(customer_address::Column::IsDefault.eq(true))
                .one(&*self.db)
                .await?
                .ok_or_else(|| {
                    ServiceError::InvalidInput("no delivery address selected".to_string())
                }),
        }
    }
}
