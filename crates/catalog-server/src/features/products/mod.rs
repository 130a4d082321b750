pub mod queries;
pub mod routes;

pub use queries::{
    GetProductError, GetProductQuery, ListProductsError, ListProductsQuery, ListProductsResponse,
};

pub use routes::products_routes;
