use url::Url;

use crate::domain::identity;
use crate::domain::report::Report;
use crate::infra::mailer::EmailMessage;
use crate::infra::queue::MailQueue;

const EMAIL_PREVIEW_CHARS: usize = 100;
const EMAIL_PREVIEW_KEEP: usize = 97;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailTemplate {
    pub subject: String,
    pub body: String,
}

pub fn report_link(base_url: &Url, report_id: i64) -> String {
    format!("{}/report/{}", base_url.as_str().trim_end_matches('/'), report_id)
}

pub fn confirmation_template(base_url: &Url, report_id: i64, category_name: &str) -> EmailTemplate {
    let subject = format!("Olho Urbano - Denúncia #{} Recebida", report_id);
    let body = format!(
        "Olá,\n\n\
         Sua denúncia foi recebida com sucesso!\n\n\
         Detalhes da Denúncia:\n\
         - Número: #{id}\n\
         - Categoria: {category}\n\
         - Status: Pendente de Análise\n\n\
         Sua denúncia será analisada pela nossa equipe e você receberá atualizações sobre o andamento.\n\n\
         Para acompanhar o status da sua denúncia, acesse:\n\
         {link}\n\n\
         Obrigado por contribuir para uma cidade melhor!\n\n\
         --\n\
         Equipe Olho Urbano\n",
        id = report_id,
        category = category_name,
        link = report_link(base_url, report_id),
    );
    EmailTemplate { subject, body }
}

pub fn comment_template(
    base_url: &Url,
    report_id: i64,
    commenter_name: &str,
    content: &str,
) -> EmailTemplate {
    let subject = format!("Olho Urbano - Novo Comentário na Denúncia #{}", report_id);
    let body = format!(
        "Olá,\n\n\
         Sua denúncia recebeu um novo comentário!\n\n\
         Detalhes:\n\
         - Denúncia: #{id}\n\
         - Comentário de: {commenter}\n\
         - Conteúdo: \"{content}\"\n\n\
         Para visualizar o comentário e responder, acesse:\n\
         {link}\n\n\
         Obrigado por contribuir para uma cidade melhor!\n\n\
         --\n\
         Equipe Olho Urbano\n",
        id = report_id,
        commenter = commenter_name,
        content = content,
        link = report_link(base_url, report_id),
    );
    EmailTemplate { subject, body }
}

/// Comments longer than 100 characters are cut to 97 plus `...`.
pub fn comment_preview(content: &str) -> String {
    if content.chars().count() > EMAIL_PREVIEW_CHARS {
        let kept: String = content.chars().take(EMAIL_PREVIEW_KEEP).collect();
        format!("{}...", kept)
    } else {
        content.to_string()
    }
}

/// Owners without an email and owners commenting on their own report are not notified.
pub fn should_notify_owner(report: &Report, commenter_hash: &str) -> bool {
    !report.email.trim().is_empty() && report.hashed_cpf != commenter_hash
}

/// Composes outgoing mail and hands it to the background queue.
#[derive(Clone)]
pub struct Notifier {
    queue: MailQueue,
    base_url: Url,
}

impl Notifier {
    pub fn new(queue: MailQueue, base_url: Url) -> Self {
        Self { queue, base_url }
    }

    pub fn send_confirmation(&self, email: &str, report_id: i64, category_name: &str) -> bool {
        let template = confirmation_template(&self.base_url, report_id, category_name);
        self.enqueue(email, template)
    }

    pub fn send_comment_notification(
        &self,
        report: &Report,
        commenter_hash: &str,
        content: &str,
    ) -> bool {
        if !should_notify_owner(report, commenter_hash) {
            return false;
        }
        let template = comment_template(
            &self.base_url,
            report.id,
            &identity::display_hash(commenter_hash),
            &comment_preview(content),
        );
        self.enqueue(&report.email, template)
    }

    fn enqueue(&self, to: &str, template: EmailTemplate) -> bool {
        self.queue.enqueue(EmailMessage {
            to: to.to_string(),
            subject: template.subject,
            body: template.body,
        })
    }
}
