use storefront_api::{
    config::AppConfig,
    db::{create_pool, run_migrations},
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    run_migrations(&pool).await?;

    seed_products(&pool).await?;

    println!("Seed completed");
    Ok(())
}

async fn seed_products(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let products = vec![
        (
            "Vintage T-Shirt",
            "Vintage-style t-shirt in organic cotton",
            2999_i64,
            50_i32,
            "/placeholder-tshirt.jpg",
        ),
        (
            "Coffee Mug",
            "Ceramic coffee mug with custom design",
            1499,
            25,
            "/placeholder-mug.jpg",
        ),
        (
            "Laptop Sticker Pack",
            "Set of 10 waterproof vinyl stickers",
            999,
            100,
            "/placeholder-stickers.jpg",
        ),
        (
            "Tote Bag",
            "Canvas tote bag for shopping",
            1999,
            30,
            "/placeholder-bag.jpg",
        ),
    ];

    let mut inserted = 0;
    for (name, desc, price, inventory, image_url) in products {
        let result = sqlx::query(
            r#"
            INSERT INTO products (id, name, description, price, inventory, image_url)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(desc)
        .bind(price)
        .bind(inventory)
        .bind(image_url)
        .execute(pool)
        .await?;
        inserted += result.rows_affected();
    }

    println!("Seeded {inserted} products");
    Ok(())
}
