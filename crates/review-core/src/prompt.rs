use crate::config::{MAX_CHAR_COUNT, MIN_CHAR_COUNT, TARGET_CHAR_COUNT};

/// Render the user prompt for one review.
///
/// Deterministic: identical input yields byte-identical output. User text is
/// interpolated as-is; the destination is a language model, not markup.
pub fn build_prompt(title: &str, author: Option<&str>, focus: &str) -> String {
    let author_line = match author {
        Some(a) => format!("著者: {}\n", a),
        None => String::new(),
    };
    let book_ref = match author {
        Some(a) => format!("{}（{}）", title, a),
        None => title.to_string(),
    };

    format!(
        "以下の書籍について、読書感想文を作成してください。\n\n\
        【書籍情報】\n\
        タイトル: {title}\n\
        {author_line}\n\
        【感想文の焦点】\n\
        {focus}\n\n\
        【指示】\n\
        1. まず、この書籍「{book_ref}」について、あらすじ、主なテーマ、評価などの基本情報を調査してください\n\
        2. 上記の「感想文の焦点」を中心に、{target}文字前後の読書感想文を作成してください\n\
        3. 単なるあらすじ紹介ではなく、焦点に沿った深い考察と個人的な感想を含めてください\n\
        4. 導入（50字）→ 本文（280字）→ 結論（70字）の構成で書いてください\n\
        5. です・ます調で統一してください\n\n\
        それでは、読書感想文を作成してください:",
        title = title,
        author_line = author_line,
        focus = focus,
        book_ref = book_ref,
        target = TARGET_CHAR_COUNT,
    )
}

/// System instruction: reviewer persona plus the structure and tone rules.
pub fn system_instruction() -> String {
    format!(
        "あなたは経験豊富な書評家です。以下のガイドラインに従って読書感想文を作成してください:\n\n\
        【作成ガイドライン】\n\
        1. 構成: 導入（50字）→ 本文（280字）→ 結論（70字）の3部構成\n\
        2. 文字数: 合計{target}文字前後（{min}〜{max}文字）\n\
        3. 文体: です・ます調で統一\n\
        4. 内容:\n\
        \x20  - 導入: 本との出会いや第一印象\n\
        \x20  - 本文: ユーザーが指定した焦点に沿った具体的な考察\n\
        \x20  - 結論: 本から得た学びや今後の展望\n\
        5. 注意事項:\n\
        \x20  - あらすじの要約ではなく、個人的な感想と考察を中心に\n\
        \x20  - 具体的なエピソードや場面に言及\n\
        \x20  - 自分の経験や価値観との関連付け",
        target = TARGET_CHAR_COUNT,
        min = MIN_CHAR_COUNT,
        max = MAX_CHAR_COUNT,
    )
}

/// Escape control characters so user-supplied text cannot drive the terminal
/// or forge log lines.
pub fn sanitize_for_log(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_control() {
            out.extend(c.escape_default());
        } else {
            out.push(c);
        }
    }
    out
}
