//! Conversation flows: main menu, subscription checklist, unsubscribe
//! confirm, date-range review browsing.
//!
//! Store failures never crash a flow — the user gets a soft error with a
//! way back to the main menu, and the details go to the log.

use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use reviews_core::format::format_review_message;
use reviews_roster::Roster;
use reviews_store::repo::reviews;
use reviews_store::repo::ReviewRow;
use reviews_store::repo::subscribers::{self, SubscriberProfile};
use sqlx::PgPool;
use teloxide::prelude::*;
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, InputFile, InputMedia, InputMediaPhoto,
    MaybeInaccessibleMessage, MessageId,
};
use teloxide::utils::command::BotCommands;
use teloxide::{ApiError, RequestError};
use tracing::{error, warn};

use crate::calendar::{build_calendar, next_month, prev_month};
use crate::callbacks::{CalendarAction, CallbackAction};
use crate::plan::reconcile_subscriptions;
use crate::state::{self, BranchOption, SessionState};

/// Reviews per browse page.
const PAGE_SIZE: i64 = 5;

const EXPIRED_TEXT: &str = "❌ Сессия истекла. Используйте /start для начала.";
const ERROR_TEXT: &str = "❌ Произошла ошибка. Попробуйте позже.";

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
pub enum Command {
    Start,
    Reviews,
    Unsubscribe,
    Help,
}

#[derive(Clone)]
pub struct BotContext {
    pub pool: PgPool,
    pub roster: Arc<Roster>,
}

/// Where a reply goes: edit the message the button lives on, or send a
/// fresh one.
#[derive(Clone, Copy)]
enum Target {
    Edit(ChatId, MessageId),
    Send(ChatId),
}

// ---------------------------------------------------------------------------
// Command entry points
// ---------------------------------------------------------------------------

pub async fn handle_command(
    bot: Bot,
    ctx: BotContext,
    msg: Message,
    cmd: Command,
) -> ResponseResult<()> {
    let Some(user) = msg.from.clone() else {
        return Ok(());
    };
    let user_id = user.id.to_string();

    if let Command::Help = cmd {
        return render(&bot, Target::Send(msg.chat.id), help_text(), Some(back_keyboard())).await;
    }

    let profile = SubscriberProfile {
        username: user.username.clone(),
        first_name: Some(user.first_name.clone()),
        last_name: user.last_name.clone(),
        language_code: user.language_code.clone(),
    };
    if let Err(err) = subscribers::upsert_user(&ctx.pool, &user_id, &profile).await {
        error!(error = %err, "failed to upsert subscriber");
    }

    show_main_menu(&bot, &ctx, Target::Send(msg.chat.id), &user_id).await
}

/// Plain text while a calendar is on screen gets nudged back to it.
pub async fn handle_text(bot: Bot, ctx: BotContext, msg: Message) -> ResponseResult<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let current = state::load(&ctx.pool, &user.id.to_string())
        .await
        .ok()
        .flatten();
    if matches!(
        current,
        Some(SessionState::BrowseDateFrom { .. } | SessionState::BrowseDateTo { .. })
    ) {
        render(
            &bot,
            Target::Send(msg.chat.id),
            "📅 Пожалуйста, используйте календарь для выбора даты.".to_owned(),
            Some(back_keyboard()),
        )
        .await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Callback dispatch
// ---------------------------------------------------------------------------

pub async fn handle_callback(bot: Bot, ctx: BotContext, q: CallbackQuery) -> ResponseResult<()> {
    bot.answer_callback_query(q.id.clone()).await?;

    let user_id = q.from.id.to_string();
    let target = match q.message.as_ref() {
        Some(MaybeInaccessibleMessage::Regular(msg)) => Target::Edit(msg.chat.id, msg.id),
        Some(MaybeInaccessibleMessage::Inaccessible(msg)) => Target::Send(msg.chat.id),
        None => Target::Send(ChatId(q.from.id.0 as i64)),
    };

    let Some(action) = q.data.as_deref().and_then(CallbackAction::parse) else {
        warn!(data = ?q.data, "unrecognized callback data");
        return render(&bot, target, EXPIRED_TEXT.to_owned(), Some(restart_keyboard())).await;
    };

    match action {
        CallbackAction::MainMenu => show_main_menu(&bot, &ctx, target, &user_id).await,
        CallbackAction::MenuHelp => render(&bot, target, help_text(), Some(back_keyboard())).await,
        CallbackAction::MenuSubscribe => show_checklist(&bot, &ctx, target, &user_id).await,
        CallbackAction::ToggleBranch(branch_id) => {
            toggle_branch(&bot, &ctx, target, &user_id, &branch_id).await
        }
        CallbackAction::SelectAll => set_selection(&bot, &ctx, target, &user_id, true).await,
        CallbackAction::UnselectAll => set_selection(&bot, &ctx, target, &user_id, false).await,
        CallbackAction::ConfirmSelection => confirm_selection(&bot, &ctx, target, &user_id).await,
        CallbackAction::MenuSubscriptions => show_management(&bot, &ctx, target, &user_id).await,
        CallbackAction::ConfirmUnsubscribe => confirm_unsubscribe(&bot, target).await,
        CallbackAction::DoUnsubscribe => do_unsubscribe(&bot, &ctx, target, &user_id).await,
        CallbackAction::MenuReviews => show_browse_menu(&bot, &ctx, target, &user_id).await,
        CallbackAction::BrowseBranch(branch_id) => {
            start_browse(&bot, &ctx, target, &user_id, &branch_id).await
        }
        CallbackAction::Calendar(cal) => handle_calendar(&bot, &ctx, target, &user_id, cal).await,
        CallbackAction::ShowMore => show_more(&bot, &ctx, target, &user_id).await,
    }
}

// ---------------------------------------------------------------------------
// Main menu & help
// ---------------------------------------------------------------------------

async fn show_main_menu(
    bot: &Bot,
    ctx: &BotContext,
    target: Target,
    user_id: &str,
) -> ResponseResult<()> {
    let subs = match subscribers::active_for_user(&ctx.pool, user_id).await {
        Ok(subs) => subs,
        Err(err) => return soft_fail(bot, target, "load subscriptions", &err).await,
    };

    let mut rows = Vec::new();
    let text = if subs.is_empty() {
        rows.push(vec![button(
            "🔔 Подписаться на уведомления",
            CallbackAction::MenuSubscribe,
        )]);
        "🏪 Главное меню\n\n❌ У вас нет активных подписок\n\nВыберите действие:".to_owned()
    } else {
        rows.push(vec![button("📊 Просмотр отзывов", CallbackAction::MenuReviews)]);
        rows.push(vec![button(
            "📝 Управление подписками",
            CallbackAction::MenuSubscriptions,
        )]);
        let names: Vec<&str> = subs.iter().take(3).map(|s| s.branch_name.as_str()).collect();
        let mut summary = names.join(", ");
        if subs.len() > 3 {
            summary.push_str(&format!(" и ещё {}", subs.len() - 3));
        }
        format!(
            "🏪 Главное меню\n\n✅ Вы подписаны на уведомления: {summary}\n\nВыберите действие:"
        )
    };
    rows.push(vec![button("ℹ️ Помощь", CallbackAction::MenuHelp)]);

    render(bot, target, text, Some(InlineKeyboardMarkup::new(rows))).await
}

fn help_text() -> String {
    "ℹ️ Справка по боту\n\n\
     🔔 Подписка на уведомления:\n\
     • Выберите филиалы для получения уведомлений о новых отзывах\n\
     • Уведомления приходят в реальном времени\n\n\
     📊 Просмотр отзывов:\n\
     • Просмотр отзывов за выбранный период\n\
     • Отзывы отображаются по 5 штук\n\n\
     📝 Управление подписками:\n\
     • Добавление новых подписок\n\
     • Отписка от всех уведомлений\n\n\
     ❓ Используйте /start для возврата в главное меню"
        .to_owned()
}

// ---------------------------------------------------------------------------
// Subscribe flow
// ---------------------------------------------------------------------------

async fn show_checklist(
    bot: &Bot,
    ctx: &BotContext,
    target: Target,
    user_id: &str,
) -> ResponseResult<()> {
    let Some((selected, available)) = fresh_checklist(ctx, user_id).await else {
        return render(
            bot,
            target,
            "❌ Не удалось загрузить список филиалов. Попробуйте позже.".to_owned(),
            Some(back_keyboard()),
        )
        .await;
    };

    let session = SessionState::Choosing {
        selected: selected.clone(),
        available: available.clone(),
    };
    if let Err(err) = state::save(&ctx.pool, user_id, &session).await {
        return soft_fail(bot, target, "save checklist state", &err).await;
    }

    render(
        bot,
        target,
        checklist_text(selected.len()),
        Some(checklist_keyboard(&selected, &available)),
    )
    .await
}

/// Roster plus the user's current active selections; `None` when the
/// roster cannot be loaded at all.
async fn fresh_checklist(
    ctx: &BotContext,
    user_id: &str,
) -> Option<(Vec<String>, Vec<BranchOption>)> {
    let branches = ctx.roster.list_branches().await.ok()?;
    if branches.is_empty() {
        return None;
    }
    let available: Vec<BranchOption> = branches
        .iter()
        .map(|b| BranchOption {
            branch_id: b.branch_id.clone(),
            name: b.name.clone(),
        })
        .collect();
    let selected = subscribers::active_for_user(&ctx.pool, user_id)
        .await
        .ok()?
        .into_iter()
        .map(|s| s.branch_id)
        .collect();
    Some((selected, available))
}

async fn toggle_branch(
    bot: &Bot,
    ctx: &BotContext,
    target: Target,
    user_id: &str,
    branch_id: &str,
) -> ResponseResult<()> {
    // A pruned state is rebuilt from the store: a toggle is a pure
    // "refresh this list" interaction.
    let (mut selected, available) = match state::load(&ctx.pool, user_id).await.ok().flatten() {
        Some(SessionState::Choosing {
            selected,
            available,
        }) => (selected, available),
        _ => match fresh_checklist(ctx, user_id).await {
            Some(rebuilt) => rebuilt,
            None => {
                return render(bot, target, EXPIRED_TEXT.to_owned(), Some(restart_keyboard()))
                    .await
            }
        },
    };

    if let Some(pos) = selected.iter().position(|id| id == branch_id) {
        selected.remove(pos);
    } else if available.iter().any(|b| b.branch_id == branch_id) {
        selected.push(branch_id.to_owned());
    }

    let session = SessionState::Choosing {
        selected: selected.clone(),
        available: available.clone(),
    };
    if let Err(err) = state::save(&ctx.pool, user_id, &session).await {
        return soft_fail(bot, target, "save checklist state", &err).await;
    }

    render(
        bot,
        target,
        checklist_text(selected.len()),
        Some(checklist_keyboard(&selected, &available)),
    )
    .await
}

async fn set_selection(
    bot: &Bot,
    ctx: &BotContext,
    target: Target,
    user_id: &str,
    select_all: bool,
) -> ResponseResult<()> {
    let (_, available) = match state::load(&ctx.pool, user_id).await.ok().flatten() {
        Some(SessionState::Choosing { selected, available }) => (selected, available),
        _ => match fresh_checklist(ctx, user_id).await {
            Some(rebuilt) => rebuilt,
            None => {
                return render(bot, target, EXPIRED_TEXT.to_owned(), Some(restart_keyboard()))
                    .await
            }
        },
    };

    let selected: Vec<String> = if select_all {
        available.iter().map(|b| b.branch_id.clone()).collect()
    } else {
        Vec::new()
    };

    let session = SessionState::Choosing {
        selected: selected.clone(),
        available: available.clone(),
    };
    if let Err(err) = state::save(&ctx.pool, user_id, &session).await {
        return soft_fail(bot, target, "save checklist state", &err).await;
    }

    render(
        bot,
        target,
        checklist_text(selected.len()),
        Some(checklist_keyboard(&selected, &available)),
    )
    .await
}

async fn confirm_selection(
    bot: &Bot,
    ctx: &BotContext,
    target: Target,
    user_id: &str,
) -> ResponseResult<()> {
    let Some(SessionState::Choosing { selected, available }) =
        state::load(&ctx.pool, user_id).await.ok().flatten()
    else {
        return render(bot, target, EXPIRED_TEXT.to_owned(), Some(restart_keyboard())).await;
    };

    if selected.is_empty() {
        return render(
            bot,
            target,
            "❌ Вы не выбрали ни одного филиала. Используйте /start для начала.".to_owned(),
            Some(restart_keyboard()),
        )
        .await;
    }

    let existing = match subscribers::all_for_user(&ctx.pool, user_id).await {
        Ok(existing) => existing,
        Err(err) => return soft_fail(bot, target, "load subscriptions", &err).await,
    };
    let plan = reconcile_subscriptions(&existing, &selected, &available);
    if let Err(err) = subscribers::apply_plan(&ctx.pool, user_id, &plan).await {
        return soft_fail(bot, target, "apply subscription plan", &err).await;
    }
    let _ = state::clear(&ctx.pool, user_id).await;

    let names: Vec<String> = available
        .iter()
        .filter(|b| selected.contains(&b.branch_id))
        .map(|b| format!("• {}", b.name))
        .collect();
    let text = format!(
        "✅ Подписка настроена!\n\n\
         Вы будете получать уведомления о новых отзывах для:\n\n{}\n\n\
         Теперь вы можете просматривать отзывы и управлять подписками.",
        names.join("\n")
    );
    let keyboard = InlineKeyboardMarkup::new(vec![
        vec![button("📊 Просмотр отзывов", CallbackAction::MenuReviews)],
        vec![button("📝 Управление подписками", CallbackAction::MenuSubscriptions)],
        vec![button("🔙 Главное меню", CallbackAction::MainMenu)],
    ]);
    render(bot, target, text, Some(keyboard)).await
}

fn checklist_text(selected_count: usize) -> String {
    format!(
        "🏪 Выберите филиалы для подписки на уведомления ({selected_count} выбрано):\n\n\
         Нажмите на филиалы, которые вас интересуют, затем нажмите '✅ Подтвердить выбор'"
    )
}

fn checklist_keyboard(selected: &[String], available: &[BranchOption]) -> InlineKeyboardMarkup {
    let mut rows = Vec::with_capacity(available.len() + 3);
    let all_selected = !available.is_empty() && selected.len() == available.len();
    rows.push(vec![if all_selected {
        button("❌ Отписаться от всех", CallbackAction::UnselectAll)
    } else {
        button("✅ Подписаться на все", CallbackAction::SelectAll)
    }]);

    for branch in available {
        let label = if selected.contains(&branch.branch_id) {
            format!("✅ {}", branch.name)
        } else {
            branch.name.clone()
        };
        rows.push(vec![button(
            &label,
            CallbackAction::ToggleBranch(branch.branch_id.clone()),
        )]);
    }

    rows.push(vec![button("✅ Подтвердить выбор", CallbackAction::ConfirmSelection)]);
    rows.push(vec![button("🔙 Назад", CallbackAction::MainMenu)]);
    InlineKeyboardMarkup::new(rows)
}

// ---------------------------------------------------------------------------
// Manage subscriptions
// ---------------------------------------------------------------------------

async fn show_management(
    bot: &Bot,
    ctx: &BotContext,
    target: Target,
    user_id: &str,
) -> ResponseResult<()> {
    let subs = match subscribers::active_for_user(&ctx.pool, user_id).await {
        Ok(subs) => subs,
        Err(err) => return soft_fail(bot, target, "load subscriptions", &err).await,
    };

    if subs.is_empty() {
        let keyboard = InlineKeyboardMarkup::new(vec![
            vec![button("🔔 Подписаться", CallbackAction::MenuSubscribe)],
            vec![button("🔙 Назад", CallbackAction::MainMenu)],
        ]);
        return render(
            bot,
            target,
            "❌ У вас нет активных подписок.\n\nИспользуйте кнопку ниже для подписки на уведомления."
                .to_owned(),
            Some(keyboard),
        )
        .await;
    }

    let listing: Vec<String> = subs.iter().map(|s| format!("• {}", s.branch_name)).collect();
    let text = format!(
        "📝 Управление подписками\n\n✅ Ваши активные подписки:\n{}\n\nВыберите действие:",
        listing.join("\n")
    );
    let keyboard = InlineKeyboardMarkup::new(vec![
        vec![button("➕ Добавить подписки", CallbackAction::MenuSubscribe)],
        vec![button("🗑 Отписаться от всех", CallbackAction::ConfirmUnsubscribe)],
        vec![button("🔙 Назад", CallbackAction::MainMenu)],
    ]);
    render(bot, target, text, Some(keyboard)).await
}

async fn confirm_unsubscribe(bot: &Bot, target: Target) -> ResponseResult<()> {
    let keyboard = InlineKeyboardMarkup::new(vec![
        vec![button("✅ Да, отписаться", CallbackAction::DoUnsubscribe)],
        vec![button("❌ Отмена", CallbackAction::MenuSubscriptions)],
    ]);
    render(
        bot,
        target,
        "⚠️ Вы действительно хотите отписаться от всех уведомлений?\n\n\
         Это действие нельзя будет отменить."
            .to_owned(),
        Some(keyboard),
    )
    .await
}

async fn do_unsubscribe(
    bot: &Bot,
    ctx: &BotContext,
    target: Target,
    user_id: &str,
) -> ResponseResult<()> {
    if let Err(err) = subscribers::deactivate_all(&ctx.pool, user_id).await {
        return soft_fail(bot, target, "deactivate subscriptions", &err).await;
    }
    let keyboard = InlineKeyboardMarkup::new(vec![
        vec![button("🔔 Подписаться", CallbackAction::MenuSubscribe)],
        vec![button("🔙 Главное меню", CallbackAction::MainMenu)],
    ]);
    render(
        bot,
        target,
        "✅ Отписка выполнена!\n\n\
         Вы больше не будете получать уведомления о новых отзывах.\n\n\
         Используйте кнопку ниже для новой подписки."
            .to_owned(),
        Some(keyboard),
    )
    .await
}

// ---------------------------------------------------------------------------
// Browse flow
// ---------------------------------------------------------------------------

async fn show_browse_menu(
    bot: &Bot,
    ctx: &BotContext,
    target: Target,
    user_id: &str,
) -> ResponseResult<()> {
    let subs = match subscribers::active_for_user(&ctx.pool, user_id).await {
        Ok(subs) => subs,
        Err(err) => return soft_fail(bot, target, "load subscriptions", &err).await,
    };

    if subs.is_empty() {
        let keyboard = InlineKeyboardMarkup::new(vec![
            vec![button("🔔 Подписаться", CallbackAction::MenuSubscribe)],
            vec![button("🔙 Назад", CallbackAction::MainMenu)],
        ]);
        return render(
            bot,
            target,
            "❌ У вас нет активных подписок.\n\nДля просмотра отзывов сначала подпишитесь на филиалы."
                .to_owned(),
            Some(keyboard),
        )
        .await;
    }

    // A single subscription goes straight to the period picker.
    if let [only] = subs.as_slice() {
        let branch_id = only.branch_id.clone();
        let branch_name = only.branch_name.clone();
        return begin_date_selection(bot, ctx, target, user_id, &branch_id, &branch_name).await;
    }

    let mut rows: Vec<Vec<InlineKeyboardButton>> = subs
        .iter()
        .map(|sub| {
            vec![button(
                &sub.branch_name,
                CallbackAction::BrowseBranch(sub.branch_id.clone()),
            )]
        })
        .collect();
    rows.push(vec![button("🔙 Назад", CallbackAction::MainMenu)]);
    render(
        bot,
        target,
        "🏪 Выберите филиал для просмотра отзывов:".to_owned(),
        Some(InlineKeyboardMarkup::new(rows)),
    )
    .await
}

async fn start_browse(
    bot: &Bot,
    ctx: &BotContext,
    target: Target,
    user_id: &str,
    branch_id: &str,
) -> ResponseResult<()> {
    let subs = match subscribers::active_for_user(&ctx.pool, user_id).await {
        Ok(subs) => subs,
        Err(err) => return soft_fail(bot, target, "load subscriptions", &err).await,
    };
    let Some(sub) = subs.iter().find(|s| s.branch_id == branch_id) else {
        let keyboard =
            InlineKeyboardMarkup::new(vec![vec![button("🔙 Главное меню", CallbackAction::MainMenu)]]);
        return render(
            bot,
            target,
            "❌ Филиал не найден. Вернитесь в главное меню.".to_owned(),
            Some(keyboard),
        )
        .await;
    };
    let branch_name = sub.branch_name.clone();
    begin_date_selection(bot, ctx, target, user_id, branch_id, &branch_name).await
}

async fn begin_date_selection(
    bot: &Bot,
    ctx: &BotContext,
    target: Target,
    user_id: &str,
    branch_id: &str,
    branch_name: &str,
) -> ResponseResult<()> {
    let session = SessionState::BrowseDateFrom {
        branch_id: branch_id.to_owned(),
        branch_name: branch_name.to_owned(),
    };
    if let Err(err) = state::save(&ctx.pool, user_id, &session).await {
        return soft_fail(bot, target, "save browse state", &err).await;
    }

    let today = Utc::now();
    render(
        bot,
        target,
        format!("📅 Выбран филиал: {branch_name}\n\nВыберите дату начала периода:"),
        Some(build_calendar(today.year(), today.month())),
    )
    .await
}

async fn handle_calendar(
    bot: &Bot,
    ctx: &BotContext,
    target: Target,
    user_id: &str,
    action: CalendarAction,
) -> ResponseResult<()> {
    if matches!(action, CalendarAction::Ignore) {
        return Ok(());
    }

    let session = match state::load(&ctx.pool, user_id).await.ok().flatten() {
        Some(session) => session,
        None => {
            return render(bot, target, EXPIRED_TEXT.to_owned(), Some(restart_keyboard())).await
        }
    };

    match action {
        CalendarAction::Prev { year, month } | CalendarAction::Next { year, month } => {
            let (year, month) = if matches!(action, CalendarAction::Prev { .. }) {
                prev_month(year, month)
            } else {
                next_month(year, month)
            };
            let prompt = match &session {
                SessionState::BrowseDateFrom { branch_name, .. } => {
                    format!("📅 Выбран филиал: {branch_name}\n\nВыберите дату начала периода:")
                }
                SessionState::BrowseDateTo { date_from, .. } => format!(
                    "📅 Дата начала: {}\n\nТеперь выберите дату окончания периода:",
                    date_from.format("%d.%m.%Y")
                ),
                _ => {
                    return render(bot, target, EXPIRED_TEXT.to_owned(), Some(restart_keyboard()))
                        .await
                }
            };
            render(bot, target, prompt, Some(build_calendar(year, month))).await
        }
        CalendarAction::Day { year, month, day } => {
            let Some(picked) = NaiveDate::from_ymd_opt(year, month, day) else {
                return Ok(());
            };
            match session {
                SessionState::BrowseDateFrom {
                    branch_id,
                    branch_name,
                } => {
                    let session = SessionState::BrowseDateTo {
                        branch_id,
                        branch_name,
                        date_from: picked,
                    };
                    if let Err(err) = state::save(&ctx.pool, user_id, &session).await {
                        return soft_fail(bot, target, "save browse state", &err).await;
                    }
                    render(
                        bot,
                        target,
                        format!(
                            "📅 Дата начала: {}\n\nТеперь выберите дату окончания периода:",
                            picked.format("%d.%m.%Y")
                        ),
                        Some(build_calendar(picked.year(), picked.month())),
                    )
                    .await
                }
                SessionState::BrowseDateTo {
                    branch_id,
                    branch_name,
                    date_from,
                } => {
                    if picked < date_from {
                        // Stay on the end-date calendar with an error.
                        return render(
                            bot,
                            target,
                            format!(
                                "❌ Дата окончания не может быть раньше даты начала!\n\n\
                                 📅 Дата начала: {}\n\nВыберите дату окончания периода:",
                                date_from.format("%d.%m.%Y")
                            ),
                            Some(build_calendar(year, month)),
                        )
                        .await;
                    }
                    let session = SessionState::BrowsePage {
                        branch_id,
                        branch_name,
                        date_from,
                        date_to: picked,
                        offset: 0,
                    };
                    if let Err(err) = state::save(&ctx.pool, user_id, &session).await {
                        return soft_fail(bot, target, "save browse state", &err).await;
                    }
                    show_reviews_page(bot, ctx, target, user_id, &session).await
                }
                _ => render(bot, target, EXPIRED_TEXT.to_owned(), Some(restart_keyboard())).await,
            }
        }
        CalendarAction::Ignore => Ok(()),
    }
}

async fn show_more(
    bot: &Bot,
    ctx: &BotContext,
    target: Target,
    user_id: &str,
) -> ResponseResult<()> {
    let Some(SessionState::BrowsePage {
        branch_id,
        branch_name,
        date_from,
        date_to,
        offset,
    }) = state::load(&ctx.pool, user_id).await.ok().flatten()
    else {
        return render(bot, target, EXPIRED_TEXT.to_owned(), Some(restart_keyboard())).await;
    };

    let session = SessionState::BrowsePage {
        branch_id,
        branch_name,
        date_from,
        date_to,
        offset: offset + PAGE_SIZE,
    };
    if let Err(err) = state::save(&ctx.pool, user_id, &session).await {
        return soft_fail(bot, target, "save browse state", &err).await;
    }
    // Later pages append below the earlier ones instead of editing them.
    let chat = target_chat(target);
    show_reviews_page(bot, ctx, Target::Send(chat), user_id, &session).await
}

async fn show_reviews_page(
    bot: &Bot,
    ctx: &BotContext,
    target: Target,
    user_id: &str,
    session: &SessionState,
) -> ResponseResult<()> {
    let SessionState::BrowsePage {
        branch_id,
        branch_name,
        date_from,
        date_to,
        offset,
    } = session
    else {
        return Ok(());
    };

    let from: DateTime<Utc> = date_from
        .and_hms_opt(0, 0, 0)
        .expect("midnight exists")
        .and_utc();
    let to: DateTime<Utc> = date_to
        .and_hms_opt(23, 59, 59)
        .expect("end of day exists")
        .and_utc();

    // One extra row tells us whether a further page exists.
    let rows = match reviews::list_for_period(
        &ctx.pool,
        branch_id,
        from,
        to,
        *offset,
        PAGE_SIZE + 1,
    )
    .await
    {
        Ok(rows) => rows,
        Err(err) => return soft_fail(bot, target, "load reviews", &err).await,
    };

    let chat = target_chat(target);

    if rows.is_empty() {
        let text = if *offset == 0 {
            format!(
                "❌ Отзывов для филиала '{branch_name}' за период {} - {} не найдено.",
                date_from.format("%d.%m.%Y"),
                date_to.format("%d.%m.%Y")
            )
        } else {
            "❌ Больше отзывов нет.".to_owned()
        };
        let keyboard = InlineKeyboardMarkup::new(vec![vec![button(
            "🔙 Выбрать другой период",
            CallbackAction::BrowseBranch(branch_id.clone()),
        )]]);
        let _ = state::clear(&ctx.pool, user_id).await;
        return render(bot, target, text, Some(keyboard)).await;
    }

    if *offset == 0 {
        let header = format!(
            "📋 Отзывы для филиала '{branch_name}'\n📅 Период: {} - {}\n",
            date_from.format("%d.%m.%Y"),
            date_to.format("%d.%m.%Y")
        );
        render(bot, target, header, None).await?;
    }

    let has_more = rows.len() as i64 > PAGE_SIZE;
    let page = &rows[..rows.len().min(PAGE_SIZE as usize)];
    for review in page {
        send_review(bot, chat, review).await;
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }

    if has_more {
        let keyboard = InlineKeyboardMarkup::new(vec![
            vec![button("📄 Показать ещё", CallbackAction::ShowMore)],
            vec![button("🔙 Главное меню", CallbackAction::MainMenu)],
        ]);
        render(
            bot,
            Target::Send(chat),
            format!("Показано {} отзывов", offset + page.len() as i64),
            Some(keyboard),
        )
        .await
    } else {
        let _ = state::clear(&ctx.pool, user_id).await;
        render(
            bot,
            Target::Send(chat),
            "✅ Все отзывы за период показаны.".to_owned(),
            Some(back_keyboard()),
        )
        .await
    }
}

/// One review as its own message, photos included; any photo failure
/// degrades to plain text.
async fn send_review(bot: &Bot, chat: ChatId, review: &ReviewRow) {
    let text = format_review_message(&review.card(), false);
    let photos: Vec<url::Url> = review
        .photos_urls
        .iter()
        .take(10)
        .filter_map(|raw| url::Url::parse(raw).ok())
        .collect();

    let result: Result<(), RequestError> = match photos.len() {
        0 => bot.send_message(chat, text.clone()).await.map(|_| ()),
        1 => bot
            .send_photo(chat, InputFile::url(photos[0].clone()))
            .caption(text.clone())
            .await
            .map(|_| ()),
        _ => {
            let media: Vec<InputMedia> = photos
                .into_iter()
                .enumerate()
                .map(|(i, photo)| {
                    let mut item = InputMediaPhoto::new(InputFile::url(photo));
                    if i == 0 {
                        item = item.caption(text.clone());
                    }
                    InputMedia::Photo(item)
                })
                .collect();
            bot.send_media_group(chat, media).await.map(|_| ())
        }
    };

    if let Err(err) = result {
        warn!(error = %err, review_id = %review.review_id, "photo send failed, falling back to text");
        if let Err(err) = bot.send_message(chat, text).await {
            error!(error = %err, "review message failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering helpers
// ---------------------------------------------------------------------------

fn button(label: &str, action: CallbackAction) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(label.to_owned(), action.encode())
}

fn back_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![button("🔙 Главное меню", CallbackAction::MainMenu)]])
}

fn restart_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![button("🔄 Начать заново", CallbackAction::MainMenu)]])
}

fn target_chat(target: Target) -> ChatId {
    match target {
        Target::Edit(chat, _) | Target::Send(chat) => chat,
    }
}

async fn render(
    bot: &Bot,
    target: Target,
    text: String,
    keyboard: Option<InlineKeyboardMarkup>,
) -> ResponseResult<()> {
    let result = match target {
        Target::Edit(chat, message_id) => {
            let mut request = bot.edit_message_text(chat, message_id, text);
            if let Some(keyboard) = keyboard {
                request = request.reply_markup(keyboard);
            }
            request.await.map(|_| ())
        }
        Target::Send(chat) => {
            let request = bot.send_message(chat, text);
            match keyboard {
                Some(keyboard) => request.reply_markup(keyboard).await.map(|_| ()),
                None => request.await.map(|_| ()),
            }
        }
    };

    match result {
        Ok(()) => Ok(()),
        // Re-rendering an identical screen is not an error.
        Err(RequestError::Api(ApiError::MessageNotModified)) => Ok(()),
        Err(err) => Err(err),
    }
}

async fn soft_fail(
    bot: &Bot,
    target: Target,
    context: &str,
    err: &(dyn std::fmt::Display + Send + Sync),
) -> ResponseResult<()> {
    error!(error = %err, context, "flow step failed");
    render(bot, target, ERROR_TEXT.to_owned(), Some(restart_keyboard())).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(n: usize) -> Vec<BranchOption> {
        (1..=n)
            .map(|i| BranchOption {
                branch_id: i.to_string(),
                name: format!("Филиал {i}"),
            })
            .collect()
    }

    #[test]
    fn checklist_marks_selected_branches() {
        let available = options(3);
        let selected = vec!["2".to_owned()];
        let markup = checklist_keyboard(&selected, &available);
        let rows = &markup.inline_keyboard;
        // toggle-all + 3 branches + confirm + back
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0][0].text, "✅ Подписаться на все");
        assert_eq!(rows[1][0].text, "Филиал 1");
        assert_eq!(rows[2][0].text, "✅ Филиал 2");
    }

    #[test]
    fn checklist_offers_unselect_when_everything_is_chosen() {
        let available = options(2);
        let selected = vec!["1".to_owned(), "2".to_owned()];
        let markup = checklist_keyboard(&selected, &available);
        assert_eq!(markup.inline_keyboard[0][0].text, "❌ Отписаться от всех");
    }

    #[test]
    fn checklist_text_carries_the_count() {
        assert!(checklist_text(0).contains("(0 выбрано)"));
        assert!(checklist_text(7).contains("(7 выбрано)"));
    }
}
