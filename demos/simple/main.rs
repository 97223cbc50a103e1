use ab_cookies::{AbTestConfig, CookieSettings, Handler, SetCookie};
use http::header::{COOKIE, SET_COOKIE};
use http::{Request, Response};

pub fn main() {
    env_logger::init();

    let mut config = AbTestConfig::new("search", "localhost");
    config
        .percentage(50)
        .exit_param("exit-new-search")
        .cookie_settings(CookieSettings::insecure());

    let handler = config.to_handler(
        |_: Request<()>| Response::new("new search"),
        |_: Request<()>| Response::new("old search"),
    );

    // First visit: the client is assigned a variant and gets a cookie for it.
    let response = handler.serve(Request::new(()));
    println!("first visit served by: {}", response.body());

    let Some(set_cookie) = response
        .headers()
        .get(SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(SetCookie::parse)
    else {
        println!("no cookie written");
        return;
    };
    let cookie = format!("{}={}", set_cookie.name, set_cookie.value);
    println!("cookie: {}", cookie);

    // Returning visits keep the same variant.
    for _ in 0..3 {
        let request = Request::builder()
            .header(COOKIE, &cookie)
            .body(())
            .expect("valid request");
        println!("return visit served by: {}", handler.serve(request).body());
    }

    // Opting out pins the client to the old variant.
    let request = Request::builder()
        .uri("/?exit-new-search")
        .header(COOKIE, &cookie)
        .body(())
        .expect("valid request");
    println!("after exit served by: {}", handler.serve(request).body());
}
