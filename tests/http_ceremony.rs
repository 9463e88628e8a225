//! End-to-end ceremonies over HTTP
//!
//! A small axum relying party runs on an ephemeral port. It issues real
//! challenges, checks clientDataJSON, stores the attested public key and
//! verifies ES256 assertion signatures, so these tests exercise
//! `HttpRelyingParty` and `SoftwareAuthenticator` together.

use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use ciborium::Value as CborValue;
use p256::ecdsa::{signature::Verifier, Signature, VerifyingKey};
use p256::EncodedPoint;
use parking_lot::Mutex;
use passkey_ceremony_client::ceremony::{CeremonyOutcome, CeremonyState};
use passkey_ceremony_client::error::ErrorKind;
use passkey_ceremony_client::platform::software::{AutoPresence, SoftwareAuthenticator};
use passkey_ceremony_client::presentation::TerminalStatus;
use passkey_ceremony_client::state::CeremonyClient;
use passkey_ceremony_client::transport::HttpRelyingParty;
use rand::RngCore;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const RP_ID: &str = "localhost";

// Mock relying party

struct StoredKey {
    id: Vec<u8>,
    key: VerifyingKey,
    counter: u32,
}

#[derive(Default)]
struct Books {
    users: HashMap<String, Vec<StoredKey>>,
    pending_registration: Option<(String, Vec<u8>)>,
    pending_assertion: Option<(String, Vec<u8>)>,
}

struct MockRelyingParty {
    origin: String,
    books: Mutex<Books>,
}

impl MockRelyingParty {
    fn credential_count(&self, username: &str) -> usize {
        self.books
            .lock()
            .users
            .get(username)
            .map_or(0, Vec::len)
    }

    fn check_client_data(
        &self,
        body: &Value,
        expected_type: &str,
        challenge: &[u8],
    ) -> Result<(), String> {
        let raw = b64(&body["response"]["clientDataJSON"])?;
        let client_data: Value = serde_json::from_slice(&raw).map_err(|e| e.to_string())?;
        if client_data["type"] != expected_type {
            return Err(format!("unexpected clientData type {}", client_data["type"]));
        }
        if client_data["challenge"] != URL_SAFE_NO_PAD.encode(challenge) {
            return Err("challenge mismatch".to_string());
        }
        if client_data["origin"] != self.origin.as_str() {
            return Err(format!("origin mismatch: {}", client_data["origin"]));
        }
        Ok(())
    }

    fn finish_registration(&self, body: &Value) -> Result<(), String> {
        let mut books = self.books.lock();
        let (username, challenge) = books
            .pending_registration
            .take()
            .ok_or("no registration in progress")?;
        self.check_client_data(body, "webauthn.create", &challenge)?;

        let attestation = b64(&body["response"]["attestationObject"])?;
        let attestation: CborValue =
            ciborium::from_reader(attestation.as_slice()).map_err(|e| e.to_string())?;
        let auth_data = cbor_field(&attestation, "authData")
            .and_then(|v| v.as_bytes().cloned())
            .ok_or("attestation object has no authData")?;

        check_rp_id_hash(&auth_data)?;
        if auth_data[32] & 0x41 != 0x41 {
            return Err("user presence or attested data flag missing".to_string());
        }
        let id_len = u16::from_be_bytes([auth_data[53], auth_data[54]]) as usize;
        let id = auth_data[55..55 + id_len].to_vec();
        if id != b64(&body["rawId"])? {
            return Err("rawId does not match attested credential".to_string());
        }
        let key = cose_key(&auth_data[55 + id_len..])?;

        books.users.entry(username).or_default().push(StoredKey {
            id,
            key,
            counter: 0,
        });
        Ok(())
    }

    fn finish_assertion(&self, body: &Value) -> Result<(), String> {
        let mut books = self.books.lock();
        let (username, challenge) = books
            .pending_assertion
            .take()
            .ok_or("no assertion in progress")?;
        self.check_client_data(body, "webauthn.get", &challenge)?;

        let raw_id = b64(&body["rawId"])?;
        let stored = books
            .users
            .get_mut(&username)
            .and_then(|keys| keys.iter_mut().find(|k| k.id == raw_id))
            .ok_or("unknown credential")?;

        if let Some(handle) = body["response"]["userHandle"].as_str() {
            if URL_SAFE_NO_PAD.decode(handle).map_err(|e| e.to_string())? != username.as_bytes() {
                return Err("user handle mismatch".to_string());
            }
        }

        let auth_data = b64(&body["response"]["authenticatorData"])?;
        check_rp_id_hash(&auth_data)?;
        let counter = u32::from_be_bytes([auth_data[33], auth_data[34], auth_data[35], auth_data[36]]);
        if counter <= stored.counter {
            return Err("signature counter did not increase".to_string());
        }

        let mut signed = auth_data.clone();
        signed.extend_from_slice(&Sha256::digest(b64(&body["response"]["clientDataJSON"])?));
        let signature = Signature::from_der(&b64(&body["response"]["signature"])?)
            .map_err(|e| e.to_string())?;
        stored
            .key
            .verify(&signed, &signature)
            .map_err(|_| "Signature mismatch".to_string())?;
        stored.counter = counter;
        Ok(())
    }
}

fn b64(value: &Value) -> Result<Vec<u8>, String> {
    let text = value.as_str().ok_or("missing base64url member")?;
    URL_SAFE_NO_PAD.decode(text).map_err(|e| e.to_string())
}

fn check_rp_id_hash(auth_data: &[u8]) -> Result<(), String> {
    if auth_data.len() < 37 || auth_data[..32] != Sha256::digest(RP_ID.as_bytes())[..] {
        return Err("rpIdHash mismatch".to_string());
    }
    Ok(())
}

fn cbor_field<'a>(value: &'a CborValue, name: &str) -> Option<&'a CborValue> {
    value
        .as_map()?
        .iter()
        .find(|(k, _)| k.as_text() == Some(name))
        .map(|(_, v)| v)
}

fn cose_key(bytes: &[u8]) -> Result<VerifyingKey, String> {
    let cose: CborValue = ciborium::from_reader(bytes).map_err(|e| e.to_string())?;
    let coordinate = |label: i64| {
        cose.as_map()
            .and_then(|m| m.iter().find(|(k, _)| k.as_integer() == Some(label.into())))
            .and_then(|(_, v)| v.as_bytes().cloned())
            .ok_or(format!("COSE key has no label {}", label))
    };
    let x = coordinate(-2)?;
    let y = coordinate(-3)?;
    let point = EncodedPoint::from_affine_coordinates(x.as_slice().into(), y.as_slice().into(), false);
    VerifyingKey::from_encoded_point(&point).map_err(|e| e.to_string())
}

fn fresh_challenge() -> Vec<u8> {
    let mut challenge = vec![0u8; 32];
    rand::thread_rng().fill_bytes(&mut challenge);
    challenge
}

fn verdict(result: Result<(), String>) -> Json<Value> {
    match result {
        Ok(()) => Json(json!({ "status": "ok", "errorMessage": "" })),
        Err(message) => Json(json!({ "status": "error", "errorMessage": message })),
    }
}

// Handlers

type Shared = Arc<MockRelyingParty>;

async fn make_credential_options(
    State(rp): State<Shared>,
    Form(form): Form<HashMap<String, String>>,
) -> Json<Value> {
    let username = form.get("username").cloned().unwrap_or_default();
    if username.is_empty() {
        return verdict(Err("username is required".to_string()));
    }
    let challenge = fresh_challenge();
    let mut books = rp.books.lock();
    let exclude: Vec<Value> = books
        .users
        .get(&username)
        .into_iter()
        .flatten()
        .map(|k| json!({ "type": "public-key", "id": URL_SAFE_NO_PAD.encode(&k.id) }))
        .collect();
    books.pending_registration = Some((username.clone(), challenge.clone()));

    let attachment = form
        .get("authType")
        .filter(|a| !a.is_empty())
        .cloned()
        .map_or(Value::Null, Value::String);
    Json(json!({
        "status": "ok",
        "errorMessage": "",
        "rp": { "id": RP_ID, "name": "Mock RP" },
        "user": {
            "id": URL_SAFE_NO_PAD.encode(username.as_bytes()),
            "name": username,
            "displayName": username
        },
        "challenge": URL_SAFE_NO_PAD.encode(&challenge),
        "pubKeyCredParams": [
            { "type": "public-key", "alg": -7 },
            { "type": "public-key", "alg": -257 }
        ],
        "timeout": 60000,
        "attestation": form.get("attType").cloned().unwrap_or_else(|| "none".into()),
        "authenticatorSelection": {
            "authenticatorAttachment": attachment,
            "residentKey": form.get("residentKey").cloned().unwrap_or_default(),
            "requireResidentKey": false,
            "userVerification": form.get("userVerification").cloned().unwrap_or_default()
        },
        "excludeCredentials": exclude
    }))
}

async fn make_credential(State(rp): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    verdict(rp.finish_registration(&body))
}

async fn assertion_options(
    State(rp): State<Shared>,
    Form(form): Form<HashMap<String, String>>,
) -> Json<Value> {
    let username = form.get("username").cloned().unwrap_or_default();
    let mut books = rp.books.lock();
    let Some(keys) = books.users.get(&username).filter(|k| !k.is_empty()) else {
        return verdict(Err(format!("unknown user {}", username)));
    };
    let allow: Vec<Value> = keys
        .iter()
        .map(|k| json!({ "type": "public-key", "id": URL_SAFE_NO_PAD.encode(&k.id) }))
        .collect();
    let challenge = fresh_challenge();
    books.pending_assertion = Some((username, challenge.clone()));

    Json(json!({
        "status": "ok",
        "errorMessage": "",
        "challenge": URL_SAFE_NO_PAD.encode(&challenge),
        "timeout": 60000,
        "rpId": RP_ID,
        "allowCredentials": allow,
        "userVerification": form.get("userVerification").cloned().unwrap_or_default()
    }))
}

async fn make_assertion(State(rp): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    verdict(rp.finish_assertion(&body))
}

// Harness

async fn serve(app: Router, listener: tokio::net::TcpListener) {
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
}

/// Start the mock RP; returns it and the address it listens on
async fn spawn_relying_party() -> (Shared, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let rp = Arc::new(MockRelyingParty {
        origin: format!("http://{}:{}", RP_ID, addr.port()),
        books: Mutex::new(Books::default()),
    });
    let app = Router::new()
        .route("/api/makeCredentialOptions", post(make_credential_options))
        .route("/api/makeCredential", post(make_credential))
        .route("/api/assertionOptions", post(assertion_options))
        .route("/api/makeAssertion", post(make_assertion))
        .with_state(rp.clone());
    serve(app, listener).await;
    (rp, addr)
}

fn client_for(addr: SocketAddr, origin: &str) -> CeremonyClient<HttpRelyingParty> {
    let base = Url::parse(&format!("http://{}", addr)).unwrap();
    let relying_party = HttpRelyingParty::new(base, Duration::from_secs(5)).unwrap();
    let platform = Arc::new(SoftwareAuthenticator::new(
        Url::parse(origin).unwrap(),
        Arc::new(AutoPresence(true)),
    ));
    CeremonyClient::new(relying_party, platform, Arc::new(TerminalStatus))
}

fn error_kind(outcome: &CeremonyOutcome) -> Option<ErrorKind> {
    outcome.error.as_ref().map(|e| e.kind())
}

// Tests

#[tokio::test]
async fn register_then_authenticate() {
    let (rp, addr) = spawn_relying_party().await;
    let client = client_for(addr, &rp.origin);

    let registered = client.register("alice").await;
    assert!(registered.is_done(), "registration failed: {:?}", registered.error);
    assert_eq!(rp.credential_count("alice"), 1);

    let first = client.authenticate("alice").await;
    assert!(first.is_done(), "authentication failed: {:?}", first.error);

    // Counter moves forward, so a second sign-in verifies as well
    let second = client.authenticate("alice").await;
    assert!(second.is_done(), "authentication failed: {:?}", second.error);
}

#[tokio::test]
async fn second_registration_is_excluded() {
    let (rp, addr) = spawn_relying_party().await;
    let client = client_for(addr, &rp.origin);

    assert!(client.register("alice").await.is_done());
    let again = client.register("alice").await;

    assert_eq!(error_kind(&again), Some(ErrorKind::CeremonyRejected));
    assert_eq!(rp.credential_count("alice"), 1);
}

#[tokio::test]
async fn unknown_user_is_a_server_verdict() {
    let (rp, addr) = spawn_relying_party().await;
    let client = client_for(addr, &rp.origin);

    let outcome = client.authenticate("mallory").await;

    assert_eq!(error_kind(&outcome), Some(ErrorKind::ServerVerdict));
    assert_eq!(outcome.error.unwrap().user_message(), "unknown user mallory");
}

#[tokio::test]
async fn wrong_origin_fails_verification() {
    let (rp, addr) = spawn_relying_party().await;
    let client = client_for(addr, "http://localhost:1");

    let outcome = client.register("alice").await;

    assert_eq!(error_kind(&outcome), Some(ErrorKind::ServerVerdict));
    assert!(outcome
        .error
        .unwrap()
        .user_message()
        .starts_with("origin mismatch"));
    assert_eq!(rp.credential_count("alice"), 0);
}

#[tokio::test]
async fn server_failure_is_a_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().fallback(|| async {
        (StatusCode::INTERNAL_SERVER_ERROR, "database is down")
    });
    serve(app, listener).await;

    let client = client_for(addr, &format!("http://localhost:{}", addr.port()));
    let outcome = client.register("alice").await;

    assert_eq!(error_kind(&outcome), Some(ErrorKind::Transport));
    assert!(outcome.error.unwrap().to_string().contains("500"));
}

#[tokio::test]
async fn non_json_success_body_is_a_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().fallback(|| async { (StatusCode::OK, "<html>maintenance</html>") });
    serve(app, listener).await;

    let client = client_for(addr, &format!("http://localhost:{}", addr.port()));
    let outcome = client.register("alice").await;

    assert_eq!(error_kind(&outcome), Some(ErrorKind::Transport));
    assert!(matches!(outcome.state(), CeremonyState::Aborted(_)));
    assert!(outcome
        .error
        .unwrap()
        .to_string()
        .contains("malformed JSON"));
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let client = client_for(addr, &format!("http://localhost:{}", addr.port()));
    let outcome = client.authenticate("alice").await;

    assert_eq!(error_kind(&outcome), Some(ErrorKind::Transport));
}
