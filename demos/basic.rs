use error_shipper::{Breadcrumb, Level, Shipper, ShipperConfig, UserInfo};

#[tokio::main]
async fn main() {
    let config = ShipperConfig::new("https://ingest.example.com/errors", "checkout-service")
        .with_environment("production")
        .with_version("1.4.2");

    let shipper = Shipper::new(config).await;

    shipper.set_user(Some(UserInfo::with_id("user-42").with_email("user@example.com")));
    shipper.add_breadcrumb(Breadcrumb::new("cart loaded", "navigation", Level::Info));
    shipper.add_breadcrumb(Breadcrumb::new("payment submitted", "ui", Level::Info));

    let error = std::io::Error::new(std::io::ErrorKind::Other, "payment gateway unreachable");
    let outcome = shipper.capture_error(&error).await;
    println!("capture outcome: {:?}", outcome);

    shipper.flush().await;
    println!("health: {:?}", shipper.sdk_health().await);

    shipper.destroy().await;
}
