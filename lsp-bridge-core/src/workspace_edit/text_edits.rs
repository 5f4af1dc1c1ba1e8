use lsp_types::{Position, TextEdit};

/// 各行の先頭のバイト位置
fn line_starts(text: &str) -> Vec<usize> {
    let mut starts = vec![0];
    starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
    starts
}

/// 位置をバイト位置に変換する。
///
/// `character` は UTF-16 のコードユニット数で数える。行末を越えた分は次の行に食い込み、
/// テキストの末尾で止まる。存在しない行はテキストの末尾とみなす。
/// サロゲートペアの途中を指していたら、その文字の後ろに丸める。
fn offset_at(text: &str, line_starts: &[usize], position: Position) -> usize {
    let line_start = match line_starts.get(position.line as usize) {
        Some(&it) => it,
        None => return text.len(),
    };

    let character = position.character as usize;
    let mut units = 0;
    let mut offset = line_start;
    for c in text[line_start..].chars() {
        if units >= character {
            break;
        }
        units += c.len_utf16();
        offset += c.len_utf8();
    }
    offset
}

/// テキストに編集を適用する。
///
/// 位置はすべて元のテキストの上で解決して、開始位置が後ろにあるものから順に適用する。
/// 開始位置が同じなら、範囲が長いものを先に適用する。つまり、ある位置への挿入は、
/// その位置から始まる置換の結果の前に入る。
/// 開始位置と終了位置が同じ編集は入力の逆順に適用するので、同じ位置への挿入は入力の順に並ぶ。
///
/// 範囲が重なっている場合は、後ろにある編集を優先して、前にある編集の終了位置を切り詰める。
pub fn apply_text_edits(text: &str, edits: &[TextEdit]) -> String {
    let line_starts = line_starts(text);

    let mut resolved = edits
        .iter()
        .enumerate()
        .map(|(index, edit)| {
            let start = offset_at(text, &line_starts, edit.range.start);
            let end = offset_at(text, &line_starts, edit.range.end).max(start);
            (index, start, end, edit.new_text.as_str())
        })
        .collect::<Vec<_>>();
    resolved.sort_by(|l, r| {
        r.1.cmp(&l.1)
            .then(r.2.cmp(&l.2))
            .then(r.0.cmp(&l.0))
    });

    let mut output = text.to_string();
    let mut limit = text.len();
    for (index, start, end, new_text) in resolved {
        let end = if end > limit {
            warn!(
                "Overlapping text edit #{} ({}..{}) clamped to {}",
                index, start, end, limit
            );
            limit
        } else {
            end
        };

        output.replace_range(start..end, new_text);
        limit = start;
    }
    output
}
