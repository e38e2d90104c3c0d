use course_payments::gateways::mock::MockGateway;
use course_payments::gateways::PaymentGateway;

#[test]
fn valid_signature_is_accepted() {
    let gateway = MockGateway::new("whsec_test123");
    let body = br#"{"event":"payment.captured","payload":{"transaction_id":"6f9619ff-8b86-d011-b42d-00c04fc964ff","gateway_payment_id":"pay_1"}}"#;
    let signature = gateway.sign(body);
    assert!(gateway.verify_webhook_signature(body, &signature));
}

#[test]
fn wrong_secret_is_rejected() {
    let signer = MockGateway::new("wrong_secret");
    let verifier = MockGateway::new("whsec_test123");
    let body = br#"{"event":"payment.captured"}"#;
    let signature = signer.sign(body);
    assert!(!verifier.verify_webhook_signature(body, &signature));
}

#[test]
fn tampered_payload_is_rejected() {
    let gateway = MockGateway::new("whsec_test123");
    let signature = gateway.sign(br#"{"amount_minor":94400}"#);
    assert!(!gateway.verify_webhook_signature(br#"{"amount_minor":1}"#, &signature));
}

#[test]
fn garbage_signature_is_rejected() {
    let gateway = MockGateway::new("whsec_test123");
    assert!(!gateway.verify_webhook_signature(b"{}", "not-hex"));
    assert!(!gateway.verify_webhook_signature(b"{}", ""));
}
