use ab_cookies::{
    AbTestCodec, AbTestConfig, AssignmentWindow, CookieSettings, CookieTime, Handler, SetCookie,
    Variant,
};
use chrono::Duration;
use http::header::{COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderValue, Request, Response};

const TEST_ID: &str = "test-aspect";
const SECOND_TEST_ID: &str = "second-aspect";
const EXIT: &str = "exit-new-test";

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn serve_new(_: Request<()>) -> Response<Variant> {
    Response::new(Variant::New)
}

fn serve_old(_: Request<()>) -> Response<Variant> {
    Response::new(Variant::Old)
}

fn config(percentage: u8) -> AbTestConfig {
    let mut config = AbTestConfig::new(TEST_ID, "my-domain");
    config.percentage(percentage).exit_param(EXIT);
    config
}

/// `name=value` for replaying a `Set-Cookie` header on the next request.
fn replay(response: &Response<Variant>) -> String {
    let header = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
    let cookie = SetCookie::parse(header).unwrap();
    format!("{}={}", cookie.name, cookie.value)
}

fn request(uri: &str, cookie: Option<&str>) -> Request<()> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(()).unwrap()
}

fn stored_window(cookie: &str, test_id: &str) -> AssignmentWindow {
    let mut headers = HeaderMap::new();
    headers.insert(COOKIE, HeaderValue::from_str(cookie).unwrap());
    AbTestCodec::new("my-domain", CookieSettings::default())
        .get(&headers, test_id)
        .unwrap()
}

#[test]
fn splits_fresh_clients_by_percentage_and_sticks() {
    init_logging();
    let handler = config(40).to_handler(serve_new, serve_old);

    let users: Vec<(Variant, String)> = (0..500)
        .map(|_| {
            let response = handler.serve(request("/", None));
            assert_eq!(response.headers().get_all(SET_COOKIE).iter().count(), 1);
            (*response.body(), replay(&response))
        })
        .collect();

    let new = users.iter().filter(|(v, _)| *v == Variant::New).count();
    // 40% of 500, give or take 20 percentage points
    assert!((100..=300).contains(&new), "{new} of 500 served by new");

    for (variant, cookie) in &users {
        let response = handler.serve(request("/", Some(cookie.as_str())));
        assert_eq!(response.body(), variant);
        assert!(response.headers().get(SET_COOKIE).is_none());
    }
}

#[test]
fn percentage_extremes() {
    let all_new = config(100).to_handler(serve_new, serve_old);
    let all_old = config(0).to_handler(serve_new, serve_old);
    for _ in 0..50 {
        assert_eq!(*all_new.serve(request("/", None)).body(), Variant::New);
        assert_eq!(*all_old.serve(request("/", None)).body(), Variant::Old);
    }
}

#[test]
fn exit_parameter_moves_new_clients_to_old() {
    init_logging();
    let handler = config(100).to_handler(serve_new, serve_old);

    let first = handler.serve(request("/", None));
    assert_eq!(*first.body(), Variant::New);
    let cookie = replay(&first);

    let exited = handler.serve(request("/?exit-new-test", Some(&cookie)));
    assert_eq!(*exited.body(), Variant::Old);

    let exit_cookie = replay(&exited);
    let window = stored_window(&exit_cookie, TEST_ID);
    let (new, old) = (window.new.unwrap(), window.old.unwrap());
    assert_eq!(new.saturating_add(Duration::hours(24)), old);
    assert!(!new.is_after(&CookieTime::now()));

    // and they stay there without the parameter
    let next = handler.serve(request("/", Some(&exit_cookie)));
    assert_eq!(*next.body(), Variant::Old);
}

#[test]
fn assignment_for_one_test_keeps_other_tests() {
    let other = r#"{"second-aspect":{"new":"2021-12-31T09:30:00","old":"2022-01-01T09:30:00"}}"#;
    let cookie = format!("ab_test={}", ab_cookies::cookies::query_escape(other));

    let response = config(100)
        .to_handler(serve_new, serve_old)
        .serve(request("/", Some(&cookie)));
    let updated = replay(&response);

    assert_eq!(
        stored_window(&updated, SECOND_TEST_ID),
        stored_window(&cookie, SECOND_TEST_ID)
    );
    assert_eq!(
        stored_window(&updated, TEST_ID).active_variant(CookieTime::now()),
        Some(Variant::New)
    );
}

#[test]
fn purge_mode_strips_only_the_finished_test() {
    init_logging();
    let mut config = config(0);
    config.enabled(false);
    let handler = config.to_handler(serve_new, serve_old);

    let both = r#"{"second-aspect":{"new":"2021-12-31T09:30:00","old":"2022-01-01T09:30:00"},"test-aspect":{"new":"2020-06-16T17:28:45","old":"2020-06-15T17:28:45"}}"#;
    let cookie = format!("ab_test={}", ab_cookies::cookies::query_escape(both));

    let response = handler.serve(request("/", Some(&cookie)));
    assert_eq!(*response.body(), Variant::New);
    assert_eq!(
        replay(&response),
        format!(
            "ab_test={}",
            ab_cookies::cookies::query_escape(
                r#"{"second-aspect":{"new":"2021-12-31T09:30:00","old":"2022-01-01T09:30:00"}}"#
            )
        )
    );

    // nothing left to purge
    let response = handler.serve(request("/", Some(&replay(&response))));
    assert_eq!(*response.body(), Variant::New);
    assert!(response.headers().get(SET_COOKIE).is_none());
}

#[test]
fn broken_cookie_never_fails_the_request() {
    let handler = config(100).to_handler(serve_new, serve_old);
    let response = handler.serve(request("/", Some("ab_test=%7Bnot-json")));
    assert_eq!(*response.body(), Variant::New);

    let window = stored_window(&replay(&response), TEST_ID);
    assert_eq!(window.active_variant(CookieTime::now()), Some(Variant::New));
}
