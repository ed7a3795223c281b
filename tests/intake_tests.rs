use licstore::config::LicenseStoreConfig;
use licstore::delivery::KeyDelivery;
use licstore::intake::{IntakeRequest, INTAKE_TRIAL_DAYS};
use licstore::plans::Plan;
use licstore::price::Price;
use licstore::records::LicenseStatus;
use licstore::store::Store;

const TRIAL_REQUEST: &str = "From: \"Linh Tran\" <Linh.Tran@Example.vn>\n\
Subject: Xin dùng thử\n\
\n\
Chào anh,\n\
Công ty: Hanoi Motion\n\
SĐT: 0987654321\n";

const LIFETIME_REQUEST: &str = "From: pat@example.com\n\
Subject: Purchase\n\
\n\
We would like a permanent license.\n";

#[test]
fn trial_request_is_fulfilled() {
    let mut store = Store::in_memory(&LicenseStoreConfig::default());
    let request = IntakeRequest::parse_message(TRIAL_REQUEST).unwrap();
    assert_eq!(request.plan, Plan::Trial);
    assert_eq!(request.sender_email, "linh.tran@example.vn");

    let (license, customer) = store.fulfil_request(&request).unwrap();
    assert_eq!(license.status, LicenseStatus::Assigned);
    assert_eq!(license.duration_days, INTAKE_TRIAL_DAYS);
    assert_eq!(customer.name, "Linh Tran");
    assert_eq!(customer.company.as_deref(), Some("Hanoi Motion"));
    assert_eq!(customer.phone.as_deref(), Some("0987654321"));
    assert_eq!(customer.keys_purchased, vec![license.key.clone()]);

    let message = KeyDelivery::compose(&license, &customer);
    assert_eq!(message.to, "linh.tran@example.vn");
    assert!(message.subject.contains("Trial"));
    assert!(message.body.contains(&license.key));
}

#[test]
fn repeat_customer_keeps_first_details() {
    let mut store = Store::in_memory(&LicenseStoreConfig::default());
    let first = IntakeRequest::parse_message(LIFETIME_REQUEST).unwrap();
    assert_eq!(first.plan, Plan::Lifetime);
    assert_eq!(first.sender_name, "Pat");
    store.fulfil_request(&first).unwrap();

    let second = IntakeRequest::parse("Patricia <pat@example.com>", "monthly plan", "").unwrap();
    let (_, customer) = store.fulfil_request(&second).unwrap();

    assert_eq!(customer.name, "Pat");
    assert_eq!(customer.keys_purchased.len(), 2);
    assert_eq!(customer.total_spent, Price::from_cents(29999 + 2999));
    assert_eq!(store.customers().len(), 1);
}

#[test]
fn write_failure_leaves_no_partial_request() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("db.json");
    let mut store = Store::open(&path, &LicenseStoreConfig::default()).unwrap();
    let before = std::fs::read(&path).unwrap();
    std::fs::create_dir(dir.path().join("db.json.tmp")).unwrap();

    let request = IntakeRequest::parse_message(TRIAL_REQUEST).unwrap();
    assert!(store.fulfil_request(&request).is_err());

    assert!(store.customers().is_empty());
    assert!(store.licenses().is_empty());
    assert_eq!(std::fs::read(&path).unwrap(), before);
}
