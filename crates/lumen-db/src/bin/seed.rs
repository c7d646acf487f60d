//! # Seed Data Generator
//!
//! Populates a development database with demo catalog, stock and one
//! fully settled sale, so the register UI has something to show.
//!
//! ## Usage
//! ```bash
//! # Seed the default dev database
//! cargo run -p lumen-db --bin seed
//!
//! # Specify database path
//! cargo run -p lumen-db --bin seed -- --db ./data/lumen.db
//!
//! # With repository logs
//! RUST_LOG=debug cargo run -p lumen-db --bin seed
//! ```

use std::env;

use lumen_core::{CustomerSnapshot, DocType, IssuerProfile, PaymentMethod, TaxCategory};
use lumen_db::checkout::{CheckoutService, PaymentOutcome};
use lumen_db::{Database, DbConfig};
use tracing_subscriber::EnvFilter;

/// Demo branch where everything gets provisioned.
const BRANCH_ID: &str = "branch-miraflores";

/// (description, brand, tax category, unit value in cents, stock)
const PRODUCTS: &[(&str, &str, TaxCategory, i64, i64)] = &[
    ("Luna monofocal CR-39 antireflejo", "Essilor", TaxCategory::Taxed, 12_000, 40),
    ("Luna fotocromática Transitions Gen8", "Transitions", TaxCategory::Taxed, 38_000, 25),
    ("Luna progresiva Varilux Comfort", "Essilor", TaxCategory::Taxed, 65_000, 15),
    ("Montura acetato clásica", "Vogue", TaxCategory::Taxed, 22_000, 30),
    ("Montura metal titanio", "RayBan", TaxCategory::Taxed, 48_000, 12),
    ("Lente de contacto mensual -2.00", "Acuvue", TaxCategory::Taxed, 9_500, 60),
    ("Solución multipropósito 360ml", "Renu", TaxCategory::Taxed, 3_200, 50),
    ("Estuche rígido con paño", "Generic", TaxCategory::Taxed, 1_500, 100),
    ("Libro: cuidado de la visión", "Editorial Salud", TaxCategory::Exempt, 4_500, 8),
];

fn issuer() -> IssuerProfile {
    IssuerProfile {
        ruc: "20601234567".to_string(),
        legal_name: "ÓPTICA LUMEN S.A.C.".to_string(),
        address: "Av. Larco 345, Miraflores, Lima".to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    let mut db_path = String::from("./lumen_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Lumen POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./lumen_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Lumen POS Seed Data Generator");
    println!("================================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    if !db.catalog().list_active(1).await?.is_empty() {
        println!("⚠ Database already has products");
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    println!();
    println!("Seeding catalog and stock at {}...", BRANCH_ID);

    let mut product_ids = Vec::new();
    for (description, brand, category, value_cents, stock) in PRODUCTS {
        let product = db
            .catalog()
            .provision(
                None,
                description,
                brand,
                *category,
                *value_cents,
                &[(BRANCH_ID, *stock, 5)],
            )
            .await?;
        product_ids.push(product.id);
    }
    println!("✓ {} products provisioned", product_ids.len());

    // Open a session and run one settled sale so the demo database has a
    // boleta to print
    let session = db
        .sessions()
        .open("reg-1", "cashier-demo", BRANCH_ID, 20_000, Some("seed"))
        .await?;
    println!("✓ Cash session opened (float S/200.00)");

    let checkout = CheckoutService::new(db.clone(), issuer());
    let customer = CustomerSnapshot {
        name: "María Quispe".to_string(),
        doc_type: DocType::Dni,
        doc_number: "45781236".to_string(),
        address: String::new(),
    };

    let sale = checkout
        .create_sale("seller-demo", BRANCH_ID, customer, Some("venta de demostración"))
        .await?;
    checkout.add_line(&sale.id, &product_ids[0], 2, 0).await?;
    checkout.add_line(&sale.id, &product_ids[7], 1, 0).await?;

    let snapshot = checkout.snapshot(&sale.id).await?;
    let outcome = checkout
        .register_payment_with_session(
            &sale.id,
            &session.id,
            snapshot.sale.balance_cents,
            PaymentMethod::Cash,
            None,
            None,
        )
        .await?;

    match outcome {
        PaymentOutcome::Settled { sale, invoice } => {
            println!(
                "✓ Demo sale settled: {} for {} ({})",
                invoice.document_number(),
                sale.total(),
                sale.customer_name
            );
        }
        PaymentOutcome::Partial { .. } => {
            println!("⚠ Demo sale did not settle (unexpected)");
        }
    }

    println!();
    println!("Done. Session {} left open for the register.", session.id);
    Ok(())
}
