use crate::extractor::{extract_body_text, reject::validate};

fn page(body: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><title>Page</title><style>p {{ color: red }}</style></head><body>{body}</body></html>"
    )
}

#[test]
fn test_extract_article_container() {
    let html = page(&format!(
        r#"<nav>Home | World | Business</nav>
        <article><h1>Storm hits coast</h1>
        <p>{}</p>
        <script>trackPageView()</script>
        <aside>Related: other stories</aside></article>
        <footer>Copyright</footer>"#,
        "Heavy rain and strong winds battered the coast overnight. ".repeat(3)
    ));

    let text = extract_body_text(&html).expect("article text");
    assert!(text.starts_with("Storm hits coast"));
    assert!(text.contains("strong winds"));
    assert!(!text.contains("trackPageView"));
    assert!(!text.contains("Related"));
    assert!(!text.contains("Copyright"));
    assert!(!text.contains("Home | World"));
}

#[test]
fn test_selector_order_prefers_story_body_over_main() {
    let html = page(&format!(
        r#"<main><div class="promo">{}</div><div class="story-body">{}</div></main>"#,
        "Subscribe today for unlimited access to all of our journalism. ".repeat(3),
        "The central bank kept interest rates unchanged on Thursday, citing inflation. ".repeat(2),
    ));

    let text = extract_body_text(&html).expect("story body");
    assert!(text.contains("central bank"));
    assert!(!text.contains("Subscribe"));
}

#[test]
fn test_short_container_falls_through() {
    let html = page(&format!(
        r#"<article>Too short</article><div>{}</div>"#,
        "Plain body copy without any recognizable container markup at all. ".repeat(3)
    ));

    let text = extract_body_text(&html).expect("body fallback");
    assert!(text.contains("Plain body copy"));
}

#[test]
fn test_longest_paragraphs_fallback_keeps_reading_order() {
    let first = "First paragraph explains what happened during the summit meeting in detail. ".repeat(4);
    let second = "Second paragraph quotes officials who attended the talks in the capital city. ".repeat(4);
    let html = page(&format!(
        r#"<div class="wrapper"><p>Short caption</p><p>{first}</p><p>{second}</p></div>"#
    ));

    let text = extract_body_text(&html).expect("paragraph text");
    let a = text.find("First paragraph").expect("first");
    let b = text.find("Second paragraph").expect("second");
    assert!(a < b);
    assert!(!text.contains("Short caption"));
}

#[test]
fn test_page_without_content_is_rejected() {
    let html = page("<nav>Menu</nav><div>Loading...</div><footer>About us</footer>");
    assert!(extract_body_text(&html).is_none());
}

#[test]
fn test_malformed_html() {
    let html = format!(
        "<html><head><title>Broken</title><body><p>Unclosed tags<div>{}",
        "More content that keeps going without closing anything properly. ".repeat(3)
    );

    let text = extract_body_text(&html).expect("lenient parse");
    assert!(text.contains("Unclosed tags"));
}

#[test]
fn test_extracted_cjk_body_passes_validation() {
    let html = page(&format!("<article><p>{}</p></article>", "今天上午，国务院召开常务会议，部署进一步稳定经济增长的政策措施。".repeat(4)));
    let text = extract_body_text(&html).expect("cjk body");
    assert!(validate("国务院常务会议", &text).ok);
}

#[cfg(feature = "fuzz")]
mod fuzz {
    use crate::extractor::{clean, extract_body_text, validate};
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_extract_never_panics(html in ".*") {
            let _ = extract_body_text(&html);
        }

        #[test]
        fn test_clean_output_has_no_controls(text in ".*") {
            let cleaned = clean(&text);
            prop_assert!(cleaned.chars().all(|c| !c.is_control()));
            prop_assert_eq!(cleaned.trim(), cleaned.as_str());
        }

        #[test]
        fn test_validate_never_panics(title in ".*", body in ".*") {
            let v = validate(&title, &body);
            prop_assert_eq!(v.ok, v.reason.is_none());
        }
    }
}
