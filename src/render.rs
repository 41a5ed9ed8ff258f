//! HTML surface for a mounted view.
//!
//! Server-rendered once per page load; afterwards the inline script keeps
//! text, links and images current from the view's SSE stream and drives
//! the like button and edit panel through the JSON API.

use crate::content::ContentRecord;
use crate::layout::{CardKind, DisplayOrder};
use crate::sync::{SyncStatus, ViewSnapshot};

/// Bindings the page script computes from the content rather than reading
/// a field directly. Every other `data-field`, `data-src` or `data-href`
/// value is a (dotted) content field name.
pub const DERIVED_BINDINGS: [&str; 4] = [
    "instaCard",
    "twitterCard",
    "twitterPreviewText",
    "contact",
];

const PHOTO_CARD_IMG: &str =
    "https://images.unsplash.com/photo-1516321497487-e288fb19713f?auto=format&fit=crop&w=400";

/// Escape text for HTML element content and quoted attribute values.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Only allow link/image targets that can't run script.
fn safe_url(raw: &str) -> String {
    let lower = raw.trim().to_ascii_lowercase();
    let allowed = lower.starts_with("http://")
        || lower.starts_with("https://")
        || lower.starts_with("mailto:")
        || lower.starts_with("data:image/")
        || lower.starts_with('#')
        || lower.starts_with('/');
    if allowed {
        escape_html(raw.trim())
    } else {
        "#".to_string()
    }
}

fn status_label(status: SyncStatus) -> &'static str {
    match status {
        SyncStatus::Loading => "Chargement...",
        SyncStatus::Synced => "Synchronisé",
        SyncStatus::Local => "Mode Local",
        SyncStatus::Syncing => "Mise à jour...",
        SyncStatus::Error => "Erreur Cloud",
    }
}

/// Markup for a single card.
pub fn render_card(card: CardKind, content: &ContentRecord) -> String {
    match card {
        CardKind::Bio => format!(
            r#"<section class="card card-bio" data-card="bio"><h2>Bio</h2><p data-field="bio">{}</p></section>"#,
            escape_html(&content.bio)
        ),
        CardKind::Insta => {
            let img = content.insta_post_img.as_deref().unwrap_or(&content.insta_img);
            format!(
                r#"<a class="card card-insta" data-card="insta" data-href="links.instagram" href="{}" target="_blank" rel="noopener noreferrer"><img data-src="instaCard" src="{}" alt="Dernier post"><p>Dernier post Instagram</p></a>"#,
                safe_url(&content.links.instagram),
                safe_url(img)
            )
        }
        CardKind::Twitter => {
            let preview = if content.twitter_preview.is_empty() {
                "Voir mon dernier post sur X"
            } else {
                content.twitter_preview.as_str()
            };
            format!(
                r#"<a class="card card-twitter" data-card="twitter" data-href="twitterCard" href="{}" target="_blank" rel="noopener noreferrer"><p data-field="twitterPreviewText">{}</p><small>Dernier tweet</small></a>"#,
                safe_url(content.twitter_card_url()),
                escape_html(preview)
            )
        }
        CardKind::Socials => format!(
            r#"<section class="card card-socials" data-card="socials"><h3>Réseaux</h3><a data-href="links.instagram" href="{}" target="_blank" rel="noopener noreferrer">Instagram</a><a data-href="links.twitter" href="{}" target="_blank" rel="noopener noreferrer">X / Twitter</a><a data-href="links.linkedin" href="{}" target="_blank" rel="noopener noreferrer">LinkedIn</a></section>"#,
            safe_url(&content.links.instagram),
            safe_url(&content.links.twitter),
            safe_url(&content.links.linkedin)
        ),
        CardKind::Status => format!(
            r#"<section class="card card-status" data-card="status"><span class="dot"></span><p data-field="status">{}</p></section>"#,
            escape_html(&content.status)
        ),
        CardKind::Link => {
            let desc = content
                .portfolio_desc
                .as_deref()
                .map(|d| format!(r#"<p data-field="portfolioDesc">{}</p>"#, escape_html(d)))
                .unwrap_or_default();
            format!(
                r##"<a class="card card-link" data-card="link" href="#"><h4 data-field="portfolioTitle">{}</h4>{}</a>"##,
                escape_html(&content.portfolio_title),
                desc
            )
        }
        CardKind::Photo => format!(
            r#"<figure class="card card-photo" data-card="photo"><img src="{}" alt="Mood"></figure>"#,
            PHOTO_CARD_IMG
        ),
    }
}

fn input(label: &str, name: &str, value: &str) -> String {
    format!(
        r#"<label>{}<input name="{}" value="{}"></label>"#,
        escape_html(label),
        name,
        escape_html(value)
    )
}

fn textarea(label: &str, name: &str, value: &str) -> String {
    format!(
        r#"<label>{}<textarea name="{}" rows="3">{}</textarea></label>"#,
        escape_html(label),
        name,
        escape_html(value)
    )
}

/// Edit panel; pending form values take precedence over the live content.
fn render_edit_panel(snapshot: &ViewSnapshot) -> String {
    let c = &snapshot.content;
    let f = &snapshot.edit_form;
    let pick = |pending: &Option<String>, live: &str| pending.clone().unwrap_or_else(|| live.to_string());

    let fields = [
        input(
            "Dernier Post Instagram (URL Image)",
            "instaImg",
            &pick(&f.insta_img, &c.insta_img),
        ),
        input(
            "Dernier Tweet (URL du Post X)",
            "twitterUrl",
            &pick(&f.twitter_url, &c.twitter_url),
        ),
        textarea(
            "Texte de l'aperçu X",
            "twitterPreview",
            &pick(&f.twitter_preview, &c.twitter_preview),
        ),
        input(
            "Photo Profil (URL)",
            "profilePic",
            &pick(&f.profile_pic, &c.profile_pic),
        ),
        textarea("Bio", "bio", &pick(&f.bio, &c.bio)),
        input("Statut", "status", &pick(&f.status, &c.status)),
        input(
            "Titre du portfolio",
            "portfolioTitle",
            &pick(&f.portfolio_title, &c.portfolio_title),
        ),
        textarea(
            "Description du portfolio",
            "portfolioDesc",
            &pick(&f.portfolio_desc, c.portfolio_desc.as_deref().unwrap_or("")),
        ),
        input("Email", "email", &pick(&f.email, c.email.as_deref().unwrap_or(""))),
        input(
            "Instagram",
            "instagramLink",
            &pick(&f.instagram_link, &c.links.instagram),
        ),
        input("X / Twitter", "twitterLink", &pick(&f.twitter_link, &c.links.twitter)),
        input(
            "LinkedIn",
            "linkedinLink",
            &pick(&f.linkedin_link, &c.links.linkedin),
        ),
    ]
    .join("");

    format!(
        r#"<aside id="edit-panel" class="{}"><header><h2>Réglages</h2><button type="button" id="edit-close">×</button></header><form id="edit-form">{}<button type="submit"{}>Enregistrer</button></form></aside>"#,
        if snapshot.edit_open { "open" } else { "closed" },
        fields,
        if snapshot.can_write { "" } else { " disabled" }
    )
}

fn render_grid(order: &DisplayOrder, content: &ContentRecord) -> String {
    order
        .cards()
        .iter()
        .map(|card| render_card(*card, content))
        .collect()
}

/// Full page for a view.
pub fn render_page(snapshot: &ViewSnapshot, view_id: &str, display_name: &str) -> String {
    let content = &snapshot.content;
    let order = snapshot
        .display_order
        .clone()
        .unwrap_or_else(DisplayOrder::canonical);

    let body = if snapshot.status == SyncStatus::Loading && !snapshot.loaded {
        r#"<div class="loading">Chargement...</div>"#.to_string()
    } else {
        let liked = if content.likes > 0 { "liked" } else { "" };
        let contact = content
            .email
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .map(|e| format!("mailto:{}", e.trim()))
            .unwrap_or_else(|| "#".to_string());

        format!(
            r#"<header class="profile"><img id="profile-pic" data-src="profilePic" src="{pic}" alt="Profil"><h1>{name}</h1></header>
<main class="grid">{grid}<button type="button" id="like" class="card card-like {liked}">♥ <span data-field="likes">{likes}</span></button></main>
{panel}
<a id="contact" data-href="contact" href="{contact}">Contact</a>"#,
            pic = safe_url(&content.profile_pic),
            name = escape_html(display_name),
            grid = render_grid(&order, content),
            liked = liked,
            likes = content.likes,
            panel = render_edit_panel(snapshot),
            contact = safe_url(&contact),
        )
    };

    format!(
        r#"<!doctype html>
<html lang="fr">
<head><meta charset="utf-8"><meta name="viewport" content="width=device-width, initial-scale=1"><title>{name}</title></head>
<body data-view="{view}">
<div id="sync-status" data-status="{status}">{status_label}</div>
{body}
<script>{script}</script>
</body>
</html>"#,
        name = escape_html(display_name),
        view = escape_html(view_id),
        status = snapshot.status,
        status_label = status_label(snapshot.status),
        body = body,
        script = PAGE_SCRIPT,
    )
}

const PAGE_SCRIPT: &str = r##"
(function () {
  const view = document.body.dataset.view;
  const api = (p) => `/api/views/${view}${p}`;
  const labels = {loading: "Chargement...", synced: "Synchronisé", local: "Mode Local", syncing: "Mise à jour...", error: "Erreur Cloud"};
  const send = (method, path, body) => fetch(api(path), {method, headers: {"content-type": "application/json"}, body: body ? JSON.stringify(body) : undefined});
  const derived = {
    instaCard: (c) => c.instaPostImg || c.instaImg,
    twitterCard: (c) => c.twitterUrl || c.links.twitter,
    twitterPreviewText: (c) => c.twitterPreview || "Voir mon dernier post sur X",
    contact: (c) => (c.email && c.email.trim()) ? "mailto:" + c.email.trim() : "#",
  };
  const lookup = (c, key) => derived[key] ? derived[key](c) : key.split(".").reduce((o, k) => (o == null ? undefined : o[k]), c);
  const safeUrl = (u) => /^(https?:|mailto:|data:image\/|#|\/)/i.test(String(u || "").trim()) ? String(u).trim() : "#";
  const events = new EventSource(api("/events"));
  events.onmessage = (e) => {
    const s = JSON.parse(e.data);
    if (!document.getElementById("like")) { if (s.status !== "loading") location.reload(); return; }
    const status = document.getElementById("sync-status");
    status.dataset.status = s.status; status.textContent = labels[s.status];
    document.querySelectorAll("[data-field]").forEach((el) => { const v = lookup(s.content, el.dataset.field); if (v !== undefined && v !== null) el.textContent = v; });
    document.querySelectorAll("[data-src]").forEach((el) => { const v = lookup(s.content, el.dataset.src); if (v) el.src = safeUrl(v); });
    document.querySelectorAll("[data-href]").forEach((el) => { el.href = safeUrl(lookup(s.content, el.dataset.href)); });
    document.getElementById("edit-panel").className = s.editOpen ? "open" : "closed";
  };
  const like = document.getElementById("like");
  if (like) like.onclick = () => send("POST", "/like");
  const pic = document.getElementById("profile-pic");
  if (pic) pic.onclick = () => send("POST", "/edit");
  const close = document.getElementById("edit-close");
  if (close) close.onclick = () => send("DELETE", "/edit");
  const form = document.getElementById("edit-form");
  if (form) form.onsubmit = async (e) => {
    e.preventDefault();
    const patch = {};
    form.querySelectorAll("input, textarea").forEach((el) => { if (el.value !== el.defaultValue) patch[el.name] = el.value; });
    await send("PATCH", "/edit", patch);
    await send("POST", "/save");
  };
  window.addEventListener("pagehide", () => { events.close(); fetch(api(""), {method: "DELETE", keepalive: true}); });
})();
"##;
